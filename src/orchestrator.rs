//! Orchestrator (C10).
//!
//! Iterates groups and commands in declaration order, driving each command
//! through C5/C4 (already-applied template merge, then variable expansion)
//! → C2 (path resolve) → C1 (hash verify) → C7 (allow/risk) → C6 (env build)
//! → C8 (workdir) → C9 (exec). Repurposes the teacher's `registry.rs`
//! state-tracking idioms (`ProcessStatus`-style result enum) for a single
//! serial run instead of a concurrent session registry.

use crate::allowlist;
use crate::cancel::Cancellation;
use crate::config::types::{Config, Group};
use crate::env_filter;
use crate::error::{AllowlistError, RiskError, RunnerError, SpawnError, VerificationError};
use crate::path_resolve;
use crate::process::{self, LaunchSpec, Outcome};
use crate::vars::{Layer, VarScope, VarSource};
use crate::verify::{self, HashStore};
use crate::workspace::Workspace;
use std::collections::HashMap;
use std::path::PathBuf;

/// Outcome of one command, recorded for the final report.
#[derive(Debug)]
pub enum CommandOutcome {
    Succeeded,
    Failed { exit_code: i32 },
    TimedOut,
    CapExceeded { exit_code: i32 },
    Rejected(RunnerError),
    DryRunPlanned,
    /// The runner was cancelled (SIGINT/SIGTERM) while this command was
    /// in flight or before it could start (spec §5).
    Cancelled,
}

#[derive(Debug)]
pub struct CommandReport {
    pub group: String,
    pub command: String,
    pub outcome: CommandOutcome,
}

pub struct Orchestrator {
    config: Config,
    hash_store: HashStore,
    host_env: HashMap<String, String>,
    dry_run: bool,
    keep_temp_dirs: bool,
    system_datetime: String,
    system_pid: String,
    cancel: Cancellation,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: Config,
        hash_store_dir: PathBuf,
        dry_run: bool,
        keep_temp_dirs: bool,
    ) -> Self {
        Self::with_cancellation(config, hash_store_dir, dry_run, keep_temp_dirs, Cancellation::new())
    }

    /// As [`Orchestrator::new`], but sharing an existing [`Cancellation`]
    /// (e.g. one already wired to the process's signal handlers by `main`).
    #[must_use]
    pub fn with_cancellation(
        config: Config,
        hash_store_dir: PathBuf,
        dry_run: bool,
        keep_temp_dirs: bool,
        cancel: Cancellation,
    ) -> Self {
        Self {
            config,
            hash_store: HashStore::new(hash_store_dir),
            host_env: std::env::vars().collect(),
            dry_run,
            keep_temp_dirs,
            system_datetime: utc_timestamp(),
            system_pid: std::process::id().to_string(),
            cancel,
        }
    }

    /// Run every group/command. Returns one report per command attempted.
    /// Stops starting new groups once cancellation has been requested.
    pub async fn run(&self) -> Vec<CommandReport> {
        let mut reports = Vec::new();
        for group in &self.config.groups {
            if self.cancel.is_cancelled() {
                break;
            }
            let group_reports = self.run_group(group).await;
            reports.extend(group_reports);
        }
        reports
    }

    async fn run_group(&self, group: &Group) -> Vec<CommandReport> {
        let mut reports = Vec::new();

        let workspace = match Workspace::resolve(&group.name, group.workdir.as_deref()) {
            Ok(ws) => ws,
            Err(e) => {
                reports.push(CommandReport {
                    group: group.name.clone(),
                    command: String::new(),
                    outcome: CommandOutcome::Rejected(RunnerError::Internal(format!(
                        "failed to prepare workdir for group {:?}: {e}",
                        group.name
                    ))),
                });
                return reports;
            }
        };

        let group_effective_env_allowed = group.env_allowed.resolve(&self.config.global.env_allowed);

        for command in &group.commands {
            if self.cancel.is_cancelled() {
                reports.push(CommandReport {
                    group: group.name.clone(),
                    command: command.name.clone(),
                    outcome: CommandOutcome::Cancelled,
                });
                break;
            }
            let outcome = self
                .run_command(group, command, &workspace, &group_effective_env_allowed)
                .await;
            let aborted = matches!(
                outcome,
                CommandOutcome::Rejected(_)
                    | CommandOutcome::Failed { .. }
                    | CommandOutcome::TimedOut
                    | CommandOutcome::Cancelled
            );
            reports.push(CommandReport {
                group: group.name.clone(),
                command: command.name.clone(),
                outcome,
            });
            if aborted {
                break;
            }
        }

        let _ = workspace.cleanup(self.keep_temp_dirs);
        reports
    }

    async fn run_command(
        &self,
        group: &Group,
        command: &crate::config::types::Command,
        workspace: &Workspace,
        group_effective_env_allowed: &[String],
    ) -> CommandOutcome {
        match self
            .try_run_command(group, command, workspace, group_effective_env_allowed)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => CommandOutcome::Rejected(e),
        }
    }

    async fn try_run_command(
        &self,
        group: &Group,
        command: &crate::config::types::Command,
        workspace: &Workspace,
        group_effective_env_allowed: &[String],
    ) -> Result<CommandOutcome, RunnerError> {
        // --- C4: variable expansion -------------------------------------
        let global = &self.config.global;

        env_filter::check_imports_allowed(&global.env_import, group_effective_env_allowed)
            .map_err(RunnerError::from)?;
        env_filter::check_imports_allowed(&group.env_import, group_effective_env_allowed)
            .map_err(RunnerError::from)?;
        env_filter::check_imports_allowed(&command.env_import, group_effective_env_allowed)
            .map_err(RunnerError::from)?;

        let scope = VarScope::build([
            self.source_layer(&global.vars, &global.env_import),
            self.source_layer(&group.vars, &group.env_import),
            self.source_layer(&command.vars, &command.env_import),
        ])
        .with_system("__runner_datetime", self.system_datetime.clone())
        .with_system("__runner_pid", self.system_pid.clone())
        .with_system("__runner_workdir", workspace.path.to_string_lossy().to_string());

        let expanded_cmd = scope.expand(&command.cmd)?;
        let mut expanded_args = Vec::with_capacity(command.args.len());
        for a in &command.args {
            expanded_args.push(scope.expand(a)?);
        }
        // Kept as separate per-scope levels (not flattened) so env_filter::build
        // can enforce "duplicate within one level is fatal" without mistaking
        // a command's legitimate override of a global/group key for a collision.
        let mut expanded_env_var_levels: Vec<Vec<(String, String)>> = Vec::with_capacity(3);
        for level_vars in [&global.env_vars, &group.env_vars, &command.env_vars] {
            let mut level = Vec::with_capacity(level_vars.len());
            for (k, v) in level_vars {
                level.push((k.clone(), scope.expand(v)?));
            }
            expanded_env_var_levels.push(level);
        }
        let expanded_workdir = match &command.workdir {
            Some(p) => Some(scope.expand(&p.to_string_lossy())?),
            None => None,
        };
        let expanded_output_file = match &command.output_file {
            Some(s) => Some(scope.expand(s)?),
            None => None,
        };

        let mut verify_targets: Vec<String> = Vec::new();
        for f in global.verify_files.iter().chain(group.verify_files.iter()) {
            verify_targets.push(scope.expand(f)?);
        }

        // --- C2: path resolution -----------------------------------------
        let changes_identity = command.run_as_user.is_some() || command.run_as_group.is_some();
        if changes_identity && !expanded_cmd.starts_with('/') {
            return Err(VerificationError::NotAbsolute {
                path: expanded_cmd,
            }
            .into());
        }

        let resolved_cmd_for_checks = if expanded_cmd.starts_with('/') {
            path_resolve::resolve(&expanded_cmd)?
        } else {
            PathBuf::from(&expanded_cmd)
        };

        // --- C1: hash verification -----------------------------------------
        if self.dry_run {
            // Dry run still evaluates through AllowGated but does not touch
            // the filesystem for verification beyond what's already implied.
        } else if expanded_cmd.starts_with('/') {
            verify::verify(&self.hash_store, &resolved_cmd_for_checks, global.verify_standard_paths)
                .await?;
            tracing::info!(command = %command.name, path = %resolved_cmd_for_checks.display(), "verified");
        }
        for target in &verify_targets {
            let resolved = path_resolve::resolve(target)?;
            if !self.dry_run {
                verify::verify(&self.hash_store, &resolved, global.verify_standard_paths).await?;
                tracing::info!(command = %command.name, path = %resolved.display(), "verified");
            }
        }

        // --- C7: allowlist & risk gate -------------------------------------
        let cmd_allowed = self.resolve_group_cmd_allowed(group, &scope)?;
        let allow_target = if expanded_cmd.starts_with('/') {
            resolved_cmd_for_checks.to_string_lossy().to_string()
        } else {
            expanded_cmd.clone()
        };
        if !allowlist::is_allowed(&allow_target, &cmd_allowed) {
            tracing::warn!(command = %command.name, cmd = %allow_target, "rejected: not on allowlist");
            return Err(AllowlistError::NotAllowed { cmd: allow_target }.into());
        }

        let mut risk = allowlist::classify(&allow_target, &expanded_args);
        risk = allowlist::with_privilege_uplift(risk, changes_identity);
        if risk > command.risk_level {
            tracing::warn!(
                command = %command.name,
                computed = %risk,
                ceiling = %command.risk_level,
                "rejected: risk exceeds ceiling"
            );
            return Err(RiskError {
                command: command.name.clone(),
                computed: risk,
                ceiling: command.risk_level,
            }
            .into());
        }
        tracing::debug!(command = %command.name, risk = %risk, "allowed");

        if self.dry_run {
            return Ok(CommandOutcome::DryRunPlanned);
        }

        // --- C6: environment ------------------------------------------------
        let env_var_level_refs: Vec<&[(String, String)]> =
            expanded_env_var_levels.iter().map(Vec::as_slice).collect();
        let env = env_filter::build(&self.host_env, group_effective_env_allowed, &env_var_level_refs)
            .map_err(RunnerError::from)?;

        // --- C9: launch -------------------------------------------------------
        let workdir = match expanded_workdir {
            Some(s) if !s.is_empty() => PathBuf::from(s),
            _ => workspace.path.clone(),
        };

        let run_as_uid = match &command.run_as_user {
            Some(u) => Some(resolve_uid(u)?),
            None => None,
        };
        let run_as_gid = match &command.run_as_group {
            Some(g) => Some(resolve_gid(g)?),
            None => None,
        };

        let exec_cmd = if expanded_cmd.starts_with('/') {
            resolved_cmd_for_checks.to_string_lossy().to_string()
        } else {
            resolve_on_path(&expanded_cmd, &env)?
        };

        let spec = LaunchSpec {
            cmd: exec_cmd,
            args: expanded_args,
            env,
            workdir,
            run_as_uid,
            run_as_gid,
            output_file: expanded_output_file
                .filter(|s| !s.is_empty())
                .map(|s| resolve_output_path(&s, &workspace.path)),
            output_size_limit: global.output_size_limit,
            timeout_seconds: crate::config::effective_timeout(command.timeout_seconds, global.timeout_seconds),
        };

        let result = process::launch(&spec, &self.cancel).await?;
        Ok(match result.outcome {
            Outcome::Completed { exit_code: 0 } => CommandOutcome::Succeeded,
            Outcome::Completed { exit_code } => CommandOutcome::Failed { exit_code },
            Outcome::CapExceeded { exit_code } => CommandOutcome::CapExceeded { exit_code },
            Outcome::TimedOut => CommandOutcome::TimedOut,
            Outcome::Cancelled => CommandOutcome::Cancelled,
        })
    }

    fn source_layer(&self, vars: &[(String, String)], env_import: &[(String, String)]) -> Layer {
        let mut layer: Layer = vars
            .iter()
            .map(|(k, v)| (k.clone(), VarSource::Literal(v.clone())))
            .collect();
        for (name, system) in env_import {
            let value = self.host_env.get(system).cloned().unwrap_or_default();
            layer.push((name.clone(), VarSource::FromEnv(value)));
        }
        layer
    }

    /// `cmd_allowed` entries that still carry an unexpanded `%{...}` are
    /// resolved here, once the group's `VarScope` exists (see
    /// `config::resolve_cmd_allowed`'s placeholder note).
    fn resolve_group_cmd_allowed(
        &self,
        group: &Group,
        scope: &VarScope,
    ) -> Result<Vec<PathBuf>, RunnerError> {
        let mut out = Vec::with_capacity(group.cmd_allowed.len());
        for entry in &group.cmd_allowed {
            let raw = entry.to_string_lossy();
            if raw.contains("%{") {
                let expanded = scope.expand(&raw)?;
                out.push(path_resolve::resolve(&expanded)?);
            } else {
                out.push(entry.clone());
            }
        }
        Ok(out)
    }
}

fn resolve_uid(name: &str) -> Result<u32, SpawnError> {
    if let Ok(raw) = name.parse::<u32>() {
        return Ok(raw);
    }
    nix::unistd::User::from_name(name)
        .map_err(|e| SpawnError::UnknownUser {
            user: name.to_string(),
            reason: e.to_string(),
        })?
        .map(|u| u.uid.as_raw())
        .ok_or_else(|| SpawnError::UnknownUser {
            user: name.to_string(),
            reason: "no such user".to_string(),
        })
}

fn resolve_gid(name: &str) -> Result<u32, SpawnError> {
    if let Ok(raw) = name.parse::<u32>() {
        return Ok(raw);
    }
    nix::unistd::Group::from_name(name)
        .map_err(|e| SpawnError::UnknownGroup {
            group: name.to_string(),
            reason: e.to_string(),
        })?
        .map(|g| g.gid.as_raw())
        .ok_or_else(|| SpawnError::UnknownGroup {
            group: name.to_string(),
            reason: "no such group".to_string(),
        })
}

/// Search the child-built `PATH` for the first executable match, per spec
/// §4.9 step 1's non-absolute fallback.
fn resolve_on_path(cmd: &str, env: &HashMap<String, String>) -> Result<String, SpawnError> {
    let path = env.get("PATH").cloned().unwrap_or_default();
    for dir in path.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = PathBuf::from(dir).join(cmd);
        if is_executable_file(&candidate) {
            return Ok(candidate.to_string_lossy().to_string());
        }
    }
    Err(SpawnError::NotFound {
        cmd: cmd.to_string(),
    })
}

fn is_executable_file(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn resolve_output_path(raw: &str, workdir: &std::path::Path) -> PathBuf {
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        p
    } else {
        workdir.join(p)
    }
}

/// Sampled once per run (spec: identical for every command of the run).
fn utc_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let millis = now.subsec_millis();
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{year:04}{month:02}{day:02}{:02}{:02}{:02}.{millis:03}",
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60,
    )
}

/// Howard Hinnant's days-from-civil algorithm, inverted.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Aggregate the final process exit code from every command report, per
/// spec §6/§7's "max-severity encountered" policy.
#[must_use]
pub fn aggregate_exit_code(reports: &[CommandReport]) -> i32 {
    let mut code = 0;
    for r in reports {
        let this = match &r.outcome {
            CommandOutcome::Succeeded | CommandOutcome::DryRunPlanned => 0,
            CommandOutcome::Failed { .. } | CommandOutcome::CapExceeded { .. } => 4,
            CommandOutcome::TimedOut => 5,
            CommandOutcome::Cancelled => 6,
            CommandOutcome::Rejected(e) => crate::error::exit_code_for(e),
        };
        code = code.max(this);
    }
    code
}
