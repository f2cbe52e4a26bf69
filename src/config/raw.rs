//! Loose, serde-derived mirror of the TOML schema (spec §3, §6).
//!
//! Deliberately permissive at the type level (almost everything is
//! `Option`) so the validation pass in [`super::load_str`] can report every
//! independent violation in one go rather than failing on the first missing
//! field. `deny_unknown_fields` still makes unrecognized keys fatal at
//! decode time, per spec §6 "unknown keys are fatal to prevent silent
//! drift."

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub version: String,
    #[serde(default)]
    pub global: Option<RawGlobal>,
    #[serde(default)]
    pub command_templates: Option<BTreeMap<String, RawCommandTemplate>>,
    #[serde(default)]
    pub groups: Vec<RawGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGlobal {
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub verify_standard_paths: Option<bool>,
    /// Legacy/alternate spelling, rejected at validation time in favor of
    /// `verify_standard_paths` (spec §9 Open Question).
    #[serde(default)]
    pub skip_standard_paths: Option<bool>,
    #[serde(default)]
    pub env_allowed: Option<Vec<String>>,
    #[serde(default)]
    pub env_import: Option<Vec<String>>,
    #[serde(default)]
    pub env_vars: Option<Vec<String>>,
    #[serde(default)]
    pub vars: Option<Vec<String>>,
    #[serde(default)]
    pub verify_files: Option<Vec<String>>,
    #[serde(default)]
    pub output_size_limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub verify_files: Option<Vec<String>>,
    #[serde(default)]
    pub vars: Option<Vec<String>>,
    #[serde(default)]
    pub env_import: Option<Vec<String>>,
    #[serde(default)]
    pub env_vars: Option<Vec<String>>,
    #[serde(default)]
    pub env_allowed: Option<Vec<String>>,
    #[serde(default)]
    pub cmd_allowed: Option<Vec<String>>,
    #[serde(default)]
    pub commands: Vec<RawCommand>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommand {
    pub name: String,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub vars: Option<Vec<String>>,
    #[serde(default)]
    pub env_import: Option<Vec<String>>,
    #[serde(default)]
    pub env_vars: Option<Vec<String>>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub run_as_user: Option<String>,
    #[serde(default)]
    pub run_as_group: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Option<BTreeMap<String, toml::Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommandTemplate {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub vars: Option<Vec<String>>,
    #[serde(default)]
    pub env_import: Option<Vec<String>>,
    #[serde(default)]
    pub env_vars: Option<Vec<String>>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub run_as_user: Option<String>,
    #[serde(default)]
    pub run_as_group: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
