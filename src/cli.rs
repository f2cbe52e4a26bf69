//! Argument parsing for the `scr` binary (spec §6), grounded in
//! `doraemonkeys-sloc-guard` and `just-bash`'s `clap` derive usage.

use crate::logging::LogLevel;
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(name = "scr", about = "A safe command runner", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Load a TOML config, verify and expand it, and run its groups/commands.
    Run {
        #[arg(long = "file")]
        file: PathBuf,

        #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
        dry_run: bool,

        #[arg(long = "keep-temp-dirs", action = clap::ArgAction::SetTrue)]
        keep_temp_dirs: bool,

        #[arg(long = "hash-store", default_value = "/etc/scr/hashes")]
        hash_store: PathBuf,

        #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
        log_level: LogLevel,
    },

    /// Record the SHA-256 of each file into the hash store, for `run` to verify later.
    Record {
        files: Vec<PathBuf>,

        #[arg(long = "hash-store", default_value = "/etc/scr/hashes")]
        hash_store: PathBuf,

        #[arg(long = "force", action = clap::ArgAction::SetTrue)]
        force: bool,

        #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
        log_level: LogLevel,
    },
}
