//! Entry point for `scr`, the safe command runner.
//!
//! Parses CLI args, initializes logging, loads/validates the config, and
//! drives the orchestrator — a thin `main` that logs and delegates, the
//! same shape the teacher's `main.rs` uses for the MCP server.

use anyhow::Context as _;
use clap::Parser;
use scr::cancel::Cancellation;
use scr::cli::{Cli, Command};
use scr::orchestrator::{self, Orchestrator};
use scr::{config, logging, record};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            file,
            dry_run,
            keep_temp_dirs,
            hash_store,
            log_level,
        } => {
            logging::init(log_level);
            std::process::exit(run(&file, dry_run, keep_temp_dirs, &hash_store).await);
        }
        Command::Record {
            files,
            hash_store,
            force,
            log_level,
        } => {
            logging::init(log_level);
            std::process::exit(record_cmd(&files, &hash_store, force).await);
        }
    }
}

async fn run(
    file: &std::path::Path,
    dry_run: bool,
    keep_temp_dirs: bool,
    hash_store: &std::path::Path,
) -> i32 {
    let cfg = match config::load(file) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return 1;
        }
    };

    tracing::info!(
        groups = cfg.groups.len(),
        "loaded and validated configuration from {}",
        file.display()
    );

    let cancel = Cancellation::new();
    cancel.install_signal_handlers();
    let orchestrator =
        Orchestrator::with_cancellation(cfg, hash_store.to_path_buf(), dry_run, keep_temp_dirs, cancel);
    let reports = orchestrator.run().await;

    for report in &reports {
        match &report.outcome {
            orchestrator::CommandOutcome::Succeeded => {
                tracing::info!(group = %report.group, command = %report.command, "succeeded");
            }
            orchestrator::CommandOutcome::DryRunPlanned => {
                tracing::info!(group = %report.group, command = %report.command, "planned (dry-run)");
            }
            orchestrator::CommandOutcome::Failed { exit_code } => {
                tracing::warn!(group = %report.group, command = %report.command, exit_code, "failed");
            }
            orchestrator::CommandOutcome::CapExceeded { exit_code } => {
                tracing::warn!(group = %report.group, command = %report.command, exit_code, "output capture cap exceeded");
            }
            orchestrator::CommandOutcome::TimedOut => {
                tracing::warn!(group = %report.group, command = %report.command, "timed out");
            }
            orchestrator::CommandOutcome::Cancelled => {
                tracing::warn!(group = %report.group, command = %report.command, "cancelled");
            }
            orchestrator::CommandOutcome::Rejected(e) => {
                tracing::error!(group = %report.group, command = %report.command, "rejected: {e}");
            }
        }
    }

    if dry_run {
        let plan: Vec<_> = reports
            .iter()
            .map(|r| serde_json::json!({ "group": r.group, "command": r.command }))
            .collect();
        if let Ok(text) = serde_json::to_string_pretty(&plan) {
            println!("{text}");
        }
    }

    orchestrator::aggregate_exit_code(&reports)
}

async fn record_cmd(files: &[std::path::PathBuf], hash_store: &std::path::Path, force: bool) -> i32 {
    match try_record(files, hash_store, force).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{e:#}");
            6
        }
    }
}

async fn try_record(files: &[std::path::PathBuf], hash_store: &std::path::Path, force: bool) -> anyhow::Result<()> {
    anyhow::ensure!(!files.is_empty(), "record requires at least one file argument");
    record::record_all(hash_store, files, force)
        .await
        .with_context(|| format!("failed to record hashes into {}", hash_store.display()))?;
    Ok(())
}
