//! Validated, immutable config value objects (spec §3).
//!
//! Produced once by [`super::load`] from the loose [`super::raw`] tree after
//! every structural check passes and the template/command overlay merge
//! (DESIGN.md "Template/command field conflict") has been applied. Nothing
//! downstream re-validates this tree; it is the single source of truth for
//! the rest of the pipeline.

use crate::allowlist::RiskLevel;
use std::path::PathBuf;

/// How a scope's `env_allowed` relates to its parent (spec §4.6).
#[derive(Debug, Clone)]
pub enum EnvAllowedMode {
    /// No `env_allowed` was set at this scope; use the parent's effective set.
    Inherit,
    /// An explicit list, including an empty one (`[]` denies all imports).
    Explicit(Vec<String>),
}

impl EnvAllowedMode {
    /// Resolve against a parent's already-effective set.
    #[must_use]
    pub fn resolve(&self, parent_effective: &[String]) -> Vec<String> {
        match self {
            Self::Inherit => parent_effective.to_vec(),
            Self::Explicit(names) => names.clone(),
        }
    }
}

/// One `name=value` or `name=SYSTEM` entry, keeping definition order.
pub type Pair = (String, String);

#[derive(Debug, Clone, Default)]
pub struct Global {
    pub timeout_seconds: Option<u64>,
    pub verify_standard_paths: bool,
    pub env_allowed: Vec<String>,
    pub env_import: Vec<Pair>,
    pub env_vars: Vec<Pair>,
    pub vars: Vec<Pair>,
    pub verify_files: Vec<String>,
    pub output_size_limit: u64,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub description: Option<String>,
    pub workdir: Option<PathBuf>,
    pub verify_files: Vec<String>,
    pub vars: Vec<Pair>,
    pub env_import: Vec<Pair>,
    pub env_vars: Vec<Pair>,
    pub env_allowed: EnvAllowedMode,
    /// Already resolved (symlinks followed, existence checked) at load time.
    pub cmd_allowed: Vec<PathBuf>,
    pub commands: Vec<Command>,
}

/// A fully merged command: if it used `template`, the template's fields have
/// already been overlaid per DESIGN.md's override/union/map-merge rules.
/// There is no residual notion of "template" at this layer.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub cmd: String,
    pub args: Vec<String>,
    pub vars: Vec<Pair>,
    pub env_import: Vec<Pair>,
    pub env_vars: Vec<Pair>,
    /// `None` here means "no override": a plain command uses the group
    /// workdir; a templated command inherits the template's `workdir`. An
    /// explicit empty-string `workdir` on a templated command is collapsed
    /// to `None` too at merge time, but that collapse happens *after* the
    /// override-vs-inherit decision, so it still blocks template inheritance
    /// (spec §4.5) — the orchestrator then falls back to the group workdir.
    pub workdir: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub run_as_user: Option<String>,
    pub run_as_group: Option<String>,
    pub risk_level: RiskLevel,
    pub output_file: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub cmd: String,
    pub args: Vec<String>,
    pub vars: Vec<Pair>,
    pub env_import: Vec<Pair>,
    pub env_vars: Vec<Pair>,
    pub workdir: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub run_as_user: Option<String>,
    pub run_as_group: Option<String>,
    pub risk_level: RiskLevel,
    pub output_file: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub global: Global,
    pub command_templates: std::collections::BTreeMap<String, CommandTemplate>,
    pub groups: Vec<Group>,
}
