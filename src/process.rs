//! Process launcher (C9).
//!
//! Generalizes the teacher's `process::run` (`/bin/sh -c` + piped output +
//! `setsid` + timeout + `SIGKILL`-only `kill_process`) into an argv-exec
//! launcher with privilege drop and SIGTERM-then-SIGKILL escalation, output
//! capped to a file instead of an in-memory line buffer.

use crate::cancel::Cancellation;
use crate::error::SpawnError;
use nix::unistd::{Gid, Uid};
use std::collections::HashMap;
use std::os::unix::process::CommandExt as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Grace period between SIGTERM and SIGKILL on timeout or cancellation.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// A fully resolved, ready-to-launch command descriptor.
pub struct LaunchSpec {
    pub cmd: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: PathBuf,
    pub run_as_uid: Option<u32>,
    pub run_as_gid: Option<u32>,
    pub output_file: Option<PathBuf>,
    pub output_size_limit: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { exit_code: i32 },
    TimedOut,
    CapExceeded { exit_code: i32 },
    /// The runner received SIGINT/SIGTERM while this command was running
    /// (spec §5 Cancellation).
    Cancelled,
}

pub struct RunResult {
    pub outcome: Outcome,
    pub duration: Duration,
}

/// Launch one command to completion per spec §4.9's state machine, racing
/// the child's exit against the timeout deadline and the runner's
/// cancellation signal, whichever fires first (spec §5).
pub async fn launch(spec: &LaunchSpec, cancel: &Cancellation) -> Result<RunResult, SpawnError> {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.cmd);
    cmd.args(&spec.args);
    cmd.current_dir(&spec.workdir);
    cmd.env_clear();
    cmd.envs(&spec.env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let run_as_uid = spec.run_as_uid;
    let run_as_gid = spec.run_as_gid;
    if run_as_uid.is_some() || run_as_gid.is_some() {
        tracing::info!(
            cmd = %spec.cmd,
            uid = ?run_as_uid,
            gid = ?run_as_gid,
            "changing child credentials before exec"
        );
        // SAFETY: pre_exec runs in the forked child before exec; it only
        // touches the child's own credentials, never the parent's.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(gid) = run_as_gid {
                    nix::unistd::setgroups(&[Gid::from_raw(gid)]).map_err(std::io::Error::from)?;
                    nix::unistd::setgid(Gid::from_raw(gid)).map_err(std::io::Error::from)?;
                }
                if let Some(uid) = run_as_uid {
                    nix::unistd::setuid(Uid::from_raw(uid)).map_err(std::io::Error::from)?;
                }
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
        cmd: spec.cmd.clone(),
        source,
    })?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let output_file = spec.output_file.clone();
    let cap = spec.output_size_limit;
    let drain = tokio::spawn(async move { drain_capped(stdout, output_file, cap).await });

    let stderr = child.stderr.take().expect("stderr was piped");
    let stderr_cmd = spec.cmd.clone();
    let stderr_drain = tokio::spawn(async move { drain_stderr_to_log(stderr, &stderr_cmd).await });

    let timeout = if spec.timeout_seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(spec.timeout_seconds))
    };

    // If cancellation was already requested before this child even started
    // (e.g. the signal arrived while verifying/gating), don't spawn further
    // work on it; still rendezvous on whichever of {exit, timeout, cancel}
    // comes first for the child already running.
    enum Raced {
        Exited(std::io::Result<std::process::ExitStatus>),
        TimedOut,
        Cancelled,
    }

    let raced = tokio::select! {
        biased;
        _ = cancel.cancelled() => Raced::Cancelled,
        r = async {
            match timeout {
                None => Raced::Exited(child.wait().await),
                Some(d) => match tokio::time::timeout(d, child.wait()).await {
                    Ok(r) => Raced::Exited(r),
                    Err(_) => Raced::TimedOut,
                },
            }
        } => r,
    };

    let status = match raced {
        Raced::Cancelled => {
            terminate_then_kill(&mut child).await;
            let _ = drain.await;
            let _ = stderr_drain.await;
            return Ok(RunResult {
                outcome: Outcome::Cancelled,
                duration: start.elapsed(),
            });
        }
        Raced::TimedOut => {
            terminate_then_kill(&mut child).await;
            let _ = drain.await;
            let _ = stderr_drain.await;
            return Ok(RunResult {
                outcome: Outcome::TimedOut,
                duration: start.elapsed(),
            });
        }
        Raced::Exited(r) => r.map_err(|source| SpawnError::Io {
            cmd: spec.cmd.clone(),
            source,
        })?,
    };
    let cap_exceeded = drain.await.unwrap_or(false);
    let _ = stderr_drain.await;
    let exit_code = status.code().unwrap_or(-1);

    let outcome = if cap_exceeded {
        Outcome::CapExceeded { exit_code }
    } else {
        Outcome::Completed { exit_code }
    };

    Ok(RunResult {
        outcome,
        duration: start.elapsed(),
    })
}

/// Drain `stdout` into `output_file` (0600, truncated) up to `cap` bytes,
/// continuing to read past the cap so the child never blocks on a full
/// pipe. Returns whether the cap was exceeded.
async fn drain_capped(
    stdout: tokio::process::ChildStdout,
    output_file: Option<PathBuf>,
    cap: u64,
) -> bool {
    let mut file = match &output_file {
        Some(path) => open_capture_file(path).await.ok(),
        None => None,
    };

    let mut reader = stdout;
    let mut buf = [0u8; 64 * 1024];
    let mut written: u64 = 0;
    let mut exceeded = false;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        if let Some(f) = file.as_mut() {
            if written < cap {
                let remaining = (cap - written) as usize;
                let take = remaining.min(n);
                if f.write_all(&buf[..take]).await.is_err() {
                    file = None;
                }
                written += take as u64;
                if take < n {
                    exceeded = true;
                }
            } else {
                exceeded = true;
            }
        }
    }
    exceeded
}

/// Route the child's stderr to the runner's own log, line by line, instead
/// of discarding it (spec §4.9 step 7).
async fn drain_stderr_to_log(stderr: tokio::process::ChildStderr, cmd: &str) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::warn!(cmd, stderr = %line, "child stderr"),
            Ok(None) | Err(_) => break,
        }
    }
}

async fn open_capture_file(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await?;
        }
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(file)
}

/// Send SIGTERM, wait a grace period, then SIGKILL if still alive. Extends
/// the teacher's `kill_process` (SIGKILL-only) with the grace-period escalation.
async fn terminate_then_kill(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let nix_pid = nix::unistd::Pid::from_raw(pid as i32);
        tracing::warn!(pid, "sending SIGTERM after timeout");
        let _ = nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGTERM);
        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
            return;
        }
        tracing::warn!(pid, "child survived grace period, sending SIGKILL");
        let _ = nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGKILL);
        let _ = child.wait().await;
    }
}
