//! Logging initialization (ambient stack).
//!
//! Directly follows the teacher's `main.rs` pattern: `tracing-subscriber`
//! writing to stderr with an `EnvFilter`, never to stdout (kept clear for
//! `--dry-run`'s JSON plan output).

use tracing_subscriber::EnvFilter;

/// The four levels the CLI accepts (spec §6 `--log-level`).
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

impl LogLevel {
    fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

pub fn init(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(level.as_tracing_level().into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
