//! End-to-end scenarios from spec §8, run against the real OS process API —
//! no mocking of `tokio::process::Command`, matching the teacher's own
//! integration-test style.

use scr::cancel::Cancellation;
use scr::config;
use scr::orchestrator::{CommandOutcome, Orchestrator};
use tempfile::TempDir;

#[tokio::test]
async fn risk_ceiling_rejects_rm_rf() {
    let text = r#"
version = "1.0"

[global]
verify_standard_paths = false

[[groups]]
name = "g1"

[[groups.commands]]
name = "danger"
cmd = "/bin/rm"
args = ["-rf", "/tmp/scr-it-does-not-exist"]
risk_level = "low"
"#;
    let cfg = config::load_str(text).unwrap();
    let hash_store = TempDir::new().unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), false, false);
    let reports = orch.run().await;

    assert_eq!(reports.len(), 1);
    match &reports[0].outcome {
        CommandOutcome::Rejected(e) => {
            assert!(matches!(e, scr::error::RunnerError::Risk(_)), "expected RiskError, got {e:?}");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn cmd_allowed_permits_nonstandard_path() {
    let dir = TempDir::new().unwrap();
    let tool = dir.path().join("tool");
    std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let text = format!(
        r#"
version = "1.0"

[global]
verify_standard_paths = false

[[groups]]
name = "g1"
cmd_allowed = ["{tool}"]

[[groups.commands]]
name = "run-tool"
cmd = "{tool}"
"#,
        tool = tool.display()
    );

    let cfg = config::load_str(&text).unwrap();
    let hash_store = TempDir::new().unwrap();
    scr::record::record_one(hash_store.path(), &tool, false).await.unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), false, false);
    let reports = orch.run().await;

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].outcome, CommandOutcome::Succeeded), "{:?}", reports[0].outcome);
}

#[tokio::test]
async fn allowlist_rejects_path_outside_global_patterns_and_cmd_allowed() {
    let dir = TempDir::new().unwrap();
    let tool = dir.path().join("tool");
    std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let text = format!(
        r#"
version = "1.0"

[global]
verify_standard_paths = false

[[groups]]
name = "g1"

[[groups.commands]]
name = "run-tool"
cmd = "{tool}"
"#,
        tool = tool.display()
    );

    let cfg = config::load_str(&text).unwrap();
    let hash_store = TempDir::new().unwrap();
    scr::record::record_one(hash_store.path(), &tool, false).await.unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), false, false);
    let reports = orch.run().await;

    match &reports[0].outcome {
        CommandOutcome::Rejected(e) => {
            assert!(matches!(e, scr::error::RunnerError::Allowlist(_)));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_escalates_to_sigkill() {
    let text = r#"
version = "1.0"

[global]
verify_standard_paths = false

[[groups]]
name = "g1"

[[groups.commands]]
name = "sleeper"
cmd = "/bin/sleep"
args = ["30"]
timeout_seconds = 1
"#;
    let cfg = config::load_str(text).unwrap();
    let hash_store = TempDir::new().unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), false, false);

    let start = std::time::Instant::now();
    let reports = orch.run().await;
    let elapsed = start.elapsed();

    assert!(matches!(reports[0].outcome, CommandOutcome::TimedOut));
    // SIGTERM at ~1s, SIGKILL at ~6s; well short of the 30s sleep duration.
    assert!(elapsed < std::time::Duration::from_secs(15), "took {elapsed:?}");
}

#[tokio::test]
async fn path_self_reference_across_layers_is_not_a_cycle() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("print_path.sh");
    std::fs::write(&script, "#!/bin/sh\nprintf '%s' \"$PATH\"\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let out_file = dir.path().join("out.txt");

    let text = format!(
        r#"
version = "1.0"

[global]
verify_standard_paths = false
env_allowed = ["PATH"]

[[groups]]
name = "g1"
cmd_allowed = ["{script}"]
env_import = ["path=PATH"]

[[groups.commands]]
name = "print-path"
cmd = "{script}"
env_vars = ["PATH=/opt/bin:%{{path}}"]
output_file = "{out}"
"#,
        script = script.display(),
        out = out_file.display(),
    );

    let cfg = config::load_str(&text).unwrap();
    let host_path = std::env::var("PATH").unwrap_or_default();
    let hash_store = TempDir::new().unwrap();
    scr::record::record_one(hash_store.path(), &script, false).await.unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), false, false);
    let reports = orch.run().await;

    assert!(matches!(reports[0].outcome, CommandOutcome::Succeeded), "{:?}", reports[0].outcome);
    let captured = std::fs::read_to_string(&out_file).unwrap();
    assert_eq!(captured, format!("/opt/bin:{host_path}"));
}

#[tokio::test]
async fn dry_run_does_not_launch_anything() {
    let text = r#"
version = "1.0"

[global]
verify_standard_paths = false

[[groups]]
name = "g1"

[[groups.commands]]
name = "noop"
cmd = "/bin/sleep"
args = ["30"]
"#;
    let cfg = config::load_str(text).unwrap();
    let hash_store = TempDir::new().unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), true, false);

    let start = std::time::Instant::now();
    let reports = orch.run().await;
    let elapsed = start.elapsed();

    assert!(matches!(reports[0].outcome, CommandOutcome::DryRunPlanned));
    assert!(elapsed < std::time::Duration::from_secs(2), "dry-run should not block on sleep 30");
}

#[tokio::test]
async fn command_env_vars_override_global_env_vars_of_the_same_name() {
    let dir = TempDir::new().unwrap();
    let out_file = dir.path().join("out.txt");

    let text = format!(
        r#"
version = "1.0"

[global]
verify_standard_paths = false
env_allowed = []
env_vars = ["LOG_LEVEL=info"]

[[groups]]
name = "g1"

[[groups.commands]]
name = "print-level"
cmd = "/bin/sh"
args = ["-c", "printf '%s' \"$LOG_LEVEL\""]
env_vars = ["LOG_LEVEL=debug"]
output_file = "{out}"
"#,
        out = out_file.display(),
    );

    let cfg = config::load_str(&text).unwrap();
    let hash_store = TempDir::new().unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), false, false);
    let reports = orch.run().await;

    assert!(matches!(reports[0].outcome, CommandOutcome::Succeeded), "{:?}", reports[0].outcome);
    let captured = std::fs::read_to_string(&out_file).unwrap();
    assert_eq!(captured, "debug");
}

#[tokio::test]
async fn escaped_internal_var_reference_in_a_template_field_stays_literal() {
    let dir = TempDir::new().unwrap();
    let out_file = dir.path().join("out.txt");

    // The template's own field is an *escaped* `%{SECRET}` reference. A
    // template may never directly read a caller's internal variable (that
    // is what `TemplateReadsInternalVar` rejects for an unescaped one); the
    // escape must survive template-parameter expansion untouched and only
    // be unescaped to the literal text "%{SECRET}" during variable
    // expansion, never resolved against the calling command's `vars`.
    let text = format!(
        r#"
version = "1.0"

[global]
verify_standard_paths = false

[command_templates.t1]
cmd = "/bin/echo"
args = ["\\%{{SECRET}}"]

[[groups]]
name = "g1"

[[groups.commands]]
name = "c1"
template = "t1"
vars = {{ SECRET = "leaked" }}
output_file = "{out}"
"#,
        out = out_file.display(),
    );

    let cfg = config::load_str(&text).unwrap();
    let hash_store = TempDir::new().unwrap();
    let orch = Orchestrator::new(cfg, hash_store.path().to_path_buf(), false, false);
    let reports = orch.run().await;

    assert!(matches!(reports[0].outcome, CommandOutcome::Succeeded), "{:?}", reports[0].outcome);
    let captured = std::fs::read_to_string(&out_file).unwrap();
    assert_eq!(captured.trim(), "%{SECRET}");
}

#[tokio::test]
async fn cancellation_stops_the_in_flight_command_and_the_rest_of_the_run() {
    let text = r#"
version = "1.0"

[global]
verify_standard_paths = false

[[groups]]
name = "g1"

[[groups.commands]]
name = "slow"
cmd = "/bin/sleep"
args = ["30"]

[[groups.commands]]
name = "never-reached"
cmd = "/bin/true"

[[groups]]
name = "g2"

[[groups.commands]]
name = "also-never-reached"
cmd = "/bin/true"
"#;
    let cfg = config::load_str(text).unwrap();
    let hash_store = TempDir::new().unwrap();
    let cancel = Cancellation::new();
    let orch = Orchestrator::with_cancellation(cfg, hash_store.path().to_path_buf(), false, false, cancel.clone());

    let start = std::time::Instant::now();
    let handle = tokio::spawn(async move { orch.run().await });
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    cancel.cancel();
    let reports = handle.await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed < std::time::Duration::from_secs(10), "cancellation should not wait for sleep 30");
    assert_eq!(reports.len(), 1, "only the in-flight command should be reported, got {reports:?}");
    assert!(matches!(reports[0].outcome, CommandOutcome::Cancelled), "{:?}", reports[0].outcome);
}
