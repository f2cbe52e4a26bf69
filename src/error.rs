//! Error taxonomy for the runner.
//!
//! Each component gets its own error enum (matching the kinds in spec §7);
//! [`RunnerError`] wraps them all for the orchestrator and the CLI edge.

use std::path::PathBuf;

/// Errors raised while decoding and validating the TOML configuration (C3).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported config version {found:?}, expected \"1.0\"")]
    VersionMismatch { found: String },

    #[error("{field} is required")]
    MissingField { field: String },

    #[error("{kind} name must not be empty")]
    EmptyName { kind: String },

    #[error("duplicate {kind} name {name:?}")]
    DuplicateName { kind: String, name: String },

    #[error("invalid {kind} name {name:?}: must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidName { kind: String, name: String },

    #[error("{kind} name {name:?} uses the reserved prefix \"__runner_\"")]
    ReservedPrefix { kind: String, name: String },

    #[error("global variable {name:?} must start with an uppercase letter")]
    GlobalVarCase { name: String },

    #[error("{scope} variable {name:?} must start with a lowercase letter or underscore")]
    ScopedVarCase { scope: String, name: String },

    #[error("command {command:?} sets both \"cmd\" and \"template\"")]
    CmdAndTemplate { command: String },

    #[error("command {command:?} has neither \"cmd\" nor \"template\"")]
    NeitherCmdNorTemplate { command: String },

    #[error(
        "command {command:?} uses \"template\" and must not also set {field:?} \
         (inherited/overlaid from the template instead)"
    )]
    TemplateFieldConflict { command: String, field: String },

    #[error("command {command:?} sets \"params\" without \"template\"")]
    ParamsWithoutTemplate { command: String },

    #[error("command {command:?} references unknown template {template:?}")]
    UnknownTemplate { command: String, template: String },

    #[error("command_templates.{template:?} field {field:?} contains a %{{...}} reference; templates must not read caller variables directly")]
    TemplateReadsInternalVar { template: String, field: String },

    #[error(
        "unknown option {found:?}; did you mean {canonical:?}? \
         (verify_standard_paths is the canonical name)"
    )]
    UnknownOption { found: String, canonical: String },

    #[error("{path} in {field} is not an absolute path")]
    NotAbsolute { field: String, path: String },

    #[error("cmd_allowed entry {path:?} does not exist")]
    CmdAllowedMissing { path: PathBuf },

    #[error("malformed key=value pair {entry:?} in {field}")]
    MalformedPair { field: String, entry: String },

    #[error("invalid risk_level {level:?}, expected one of low, medium, high")]
    InvalidRiskLevel { level: String },

    #[error("{0}")]
    Other(String),

    /// Multiple independent violations collected from a single validation pass.
    #[error("{} configuration error(s):\n{}", .0.len(), render_multi(.0))]
    Multiple(Vec<ConfigError>),
}

fn render_multi(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised while expanding template parameters and internal variables (C4/C5).
#[derive(Debug, thiserror::Error)]
pub enum ExpansionError {
    #[error("undefined variable %{{{name}}}")]
    UndefinedVariable { name: String },

    #[error("undefined template parameter ${{{name}}} (not present in params)")]
    UndefinedParam { name: String },

    #[error("cyclic reference while resolving %{{{name}}}")]
    Cycle { name: String },

    #[error("param {name:?} must be a string, but is an array")]
    ParamNotString { name: String },

    #[error("param {name:?} must be an array for ${{@{name}}}, but is a string")]
    ParamNotArray { name: String },

    #[error("array element of param {name:?} is not a string")]
    ParamArrayElementNotString { name: String },

    #[error("internal variable {name:?} is not imported; SYSTEM name {system:?} is not in env_allowed")]
    ImportNotAllowed { name: String, system: String },

    #[error("unterminated {open:?} reference in {text:?}")]
    Unterminated { open: &'static str, text: String },
}

/// Errors raised while verifying file integrity (C1) or resolving paths (C2).
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("path {path:?} is not absolute")]
    NotAbsolute { path: String },

    #[error("file {path:?} does not exist")]
    Missing { path: PathBuf },

    #[error("{path:?} is not a regular file")]
    NotRegularFile { path: PathBuf },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no recorded hash for {path:?}")]
    NoRecordedHash { path: PathBuf },

    #[error("hash mismatch for {path:?}: expected {expected}, computed {actual}")]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("symlink resolution exceeded the loop cap at {path:?}")]
    SymlinkLoop { path: PathBuf },
}

/// Errors raised while matching a command against the allowlist (C7).
#[derive(Debug, thiserror::Error)]
pub enum AllowlistError {
    #[error("{cmd:?} does not match any global allowlist pattern or group cmd_allowed entry")]
    NotAllowed { cmd: String },
}

/// Errors raised when a command's computed risk exceeds its declared ceiling (C7).
#[derive(Debug, thiserror::Error)]
#[error("command {command:?} has computed risk {computed:?} exceeding its ceiling {ceiling:?}")]
pub struct RiskError {
    pub command: String,
    pub computed: crate::allowlist::RiskLevel,
    pub ceiling: crate::allowlist::RiskLevel,
}

/// Errors raised while building the child environment (C6).
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("invalid environment variable name {name:?}")]
    InvalidName { name: String },

    #[error("duplicate environment variable {name:?} within one scope")]
    Duplicate { name: String },

    #[error("environment variable name {name:?} uses the reserved prefix \"__runner_\"")]
    ReservedPrefix { name: String },

    #[error("SYSTEM name {name:?} is not present in the effective env_allowed set")]
    ImportNotAllowed { name: String },
}

/// Errors raised while launching a child process (C9).
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("executable {cmd:?} not found on PATH")]
    NotFound { cmd: String },

    #[error("failed to change working directory to {path:?}: {source}")]
    Cwd {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve run_as_user {user:?}: {reason}")]
    UnknownUser { user: String, reason: String },

    #[error("failed to resolve run_as_group {group:?}: {reason}")]
    UnknownGroup { group: String, reason: String },

    #[error("failed to spawn {cmd:?}: {source}")]
    Io {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error type aggregating every component's failures.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Expansion(#[from] ExpansionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Allowlist(#[from] AllowlistError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Maps an error (or a run outcome) to the process exit code defined in spec §6.
#[must_use]
pub fn exit_code_for(err: &RunnerError) -> i32 {
    match err {
        RunnerError::Config(_) | RunnerError::Expansion(_) => 1,
        RunnerError::Verification(_) => 2,
        RunnerError::Allowlist(_) | RunnerError::Risk(_) => 3,
        RunnerError::Env(_) | RunnerError::Spawn(_) => 6,
        RunnerError::Internal(_) => 6,
    }
}
