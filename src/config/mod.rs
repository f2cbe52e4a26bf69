//! Config loader & schema validator (C3) plus the template-overlay merge
//! described in DESIGN.md's "Template/command field conflict" decision.
//!
//! [`load`] is the single entry point: decode TOML into [`raw`] types, run
//! every structural check (collecting as many independent violations as
//! practical into [`crate::error::ConfigError::Multiple`]), substitute
//! template parameters (C5) using each command's `params`, and overlay the
//! result into the immutable [`types`] tree. `%{...}` internal-variable
//! references are deliberately left unexpanded here — the orchestrator
//! expands them per group once the group workdir exists (`__runner_workdir`),
//! per the data-flow note in spec §2.

pub mod raw;
pub mod types;

use crate::allowlist::RiskLevel;
use crate::error::ConfigError;
use crate::template::{self, ParamValue, Params};
use crate::vars::token::is_valid_name;
use std::collections::BTreeMap;
use std::path::PathBuf;

const CURRENT_VERSION: &str = "1.0";
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_OUTPUT_SIZE_LIMIT: u64 = 10 * 1024 * 1024;
const RESERVED_PREFIX: &str = "__runner_";

/// Load and fully validate a config file from disk.
pub fn load(path: &std::path::Path) -> Result<types::Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Other(format!("failed to read {}: {e}", path.display()))
    })?;
    load_str(&text)
}

/// Load and fully validate a config file from its TOML text (used directly
/// by tests to avoid filesystem fixtures).
pub fn load_str(text: &str) -> Result<types::Config, ConfigError> {
    let raw: raw::RawConfig = toml::from_str(text)?;
    let mut errors = Vec::new();

    if raw.version != CURRENT_VERSION {
        errors.push(ConfigError::VersionMismatch {
            found: raw.version.clone(),
        });
    }

    let global = build_global(raw.global, &mut errors);
    let templates = build_templates(raw.command_templates.unwrap_or_default(), &mut errors);

    if raw.groups.is_empty() {
        errors.push(ConfigError::MissingField {
            field: "groups".to_string(),
        });
    }

    let mut group_names = std::collections::HashSet::new();
    let mut groups = Vec::new();
    for raw_group in raw.groups {
        if !group_names.insert(raw_group.name.clone()) {
            errors.push(ConfigError::DuplicateName {
                kind: "group".to_string(),
                name: raw_group.name.clone(),
            });
        }
        groups.push(build_group(raw_group, &templates, &mut errors));
    }

    if !errors.is_empty() {
        return Err(ConfigError::Multiple(errors));
    }

    Ok(types::Config {
        global,
        command_templates: templates,
        groups,
    })
}

fn push_name_checks(kind: &str, name: &str, require_ident: bool, errors: &mut Vec<ConfigError>) {
    if name.is_empty() {
        errors.push(ConfigError::EmptyName {
            kind: kind.to_string(),
        });
        return;
    }
    if require_ident && !is_valid_name(name) {
        errors.push(ConfigError::InvalidName {
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
    if name.starts_with(RESERVED_PREFIX) {
        errors.push(ConfigError::ReservedPrefix {
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
}

/// Parse a `name=value` entry, used for `vars`, `env_vars`, `env_import`.
fn parse_pair(field: &str, entry: &str, errors: &mut Vec<ConfigError>) -> Option<(String, String)> {
    match entry.split_once('=') {
        Some((k, v)) => Some((k.to_string(), v.to_string())),
        None => {
            errors.push(ConfigError::MalformedPair {
                field: field.to_string(),
                entry: entry.to_string(),
            });
            None
        }
    }
}

fn parse_pairs(field: &str, entries: &[String], errors: &mut Vec<ConfigError>) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|e| parse_pair(field, e, errors))
        .collect()
}

fn check_global_var_name(name: &str, errors: &mut Vec<ConfigError>) {
    push_name_checks("global variable", name, true, errors);
    if let Some(c) = name.chars().next() {
        if !c.is_ascii_uppercase() {
            errors.push(ConfigError::GlobalVarCase {
                name: name.to_string(),
            });
        }
    }
}

fn check_scoped_var_name(scope: &str, name: &str, errors: &mut Vec<ConfigError>) {
    push_name_checks(&format!("{scope} variable"), name, true, errors);
    if let Some(c) = name.chars().next() {
        if !(c.is_ascii_lowercase() || c == '_') {
            errors.push(ConfigError::ScopedVarCase {
                scope: scope.to_string(),
                name: name.to_string(),
            });
        }
    }
}

fn build_global(raw: Option<raw::RawGlobal>, errors: &mut Vec<ConfigError>) -> types::Global {
    let raw = raw.unwrap_or_default();

    if raw.skip_standard_paths.is_some() {
        errors.push(ConfigError::UnknownOption {
            found: "skip_standard_paths".to_string(),
            canonical: "verify_standard_paths".to_string(),
        });
    }

    let vars = parse_pairs("global.vars", &raw.vars.unwrap_or_default(), errors);
    for (name, _) in &vars {
        check_global_var_name(name, errors);
    }
    let env_import = parse_pairs("global.env_import", &raw.env_import.unwrap_or_default(), errors);
    for (name, _) in &env_import {
        check_global_var_name(name, errors);
    }
    let env_vars = parse_pairs("global.env_vars", &raw.env_vars.unwrap_or_default(), errors);

    types::Global {
        timeout_seconds: raw.timeout_seconds,
        verify_standard_paths: raw.verify_standard_paths.unwrap_or(true),
        env_allowed: raw.env_allowed.unwrap_or_default(),
        env_import,
        env_vars,
        vars,
        verify_files: raw.verify_files.unwrap_or_default(),
        output_size_limit: raw.output_size_limit.unwrap_or(DEFAULT_OUTPUT_SIZE_LIMIT),
    }
}

fn build_templates(
    raw: BTreeMap<String, raw::RawCommandTemplate>,
    errors: &mut Vec<ConfigError>,
) -> BTreeMap<String, types::CommandTemplate> {
    let mut out = BTreeMap::new();
    for (name, t) in raw {
        push_name_checks("template", &name, true, errors);

        let cmd = t.cmd.clone().unwrap_or_default();
        if cmd.is_empty() {
            errors.push(ConfigError::MissingField {
                field: format!("command_templates.{name}.cmd"),
            });
        }
        check_template_field(&name, "cmd", &cmd, errors);
        let args = t.args.clone().unwrap_or_default();
        for a in &args {
            check_template_field(&name, "args", a, errors);
        }
        let env_vars = parse_pairs(
            &format!("command_templates.{name}.env_vars"),
            &t.env_vars.clone().unwrap_or_default(),
            errors,
        );
        for (_, v) in &env_vars {
            check_template_field(&name, "env_vars", v, errors);
        }
        let workdir = t.workdir.clone().unwrap_or_default();
        check_template_field(&name, "workdir", &workdir, errors);
        let output_file = t.output_file.clone().unwrap_or_default();
        check_template_field(&name, "output_file", &output_file, errors);

        let vars = parse_pairs(
            &format!("command_templates.{name}.vars"),
            &t.vars.unwrap_or_default(),
            errors,
        );
        let env_import = parse_pairs(
            &format!("command_templates.{name}.env_import"),
            &t.env_import.unwrap_or_default(),
            errors,
        );
        let risk_level = parse_risk_level(t.risk_level, errors);

        out.insert(
            name,
            types::CommandTemplate {
                cmd,
                args,
                vars,
                env_import,
                env_vars,
                workdir: non_empty_path(t.workdir),
                timeout_seconds: t.timeout_seconds,
                run_as_user: t.run_as_user,
                run_as_group: t.run_as_group,
                risk_level,
                output_file: t.output_file,
                description: t.description,
            },
        );
    }
    out
}

fn check_template_field(template: &str, field: &str, raw: &str, errors: &mut Vec<ConfigError>) {
    if template::field_reads_internal_var(raw) {
        errors.push(ConfigError::TemplateReadsInternalVar {
            template: template.to_string(),
            field: field.to_string(),
        });
    }
}

fn parse_risk_level(level: Option<String>, errors: &mut Vec<ConfigError>) -> RiskLevel {
    match level {
        None => RiskLevel::Low,
        Some(s) => RiskLevel::parse(&s).unwrap_or_else(|| {
            errors.push(ConfigError::InvalidRiskLevel { level: s });
            RiskLevel::Low
        }),
    }
}

fn non_empty_path(s: Option<String>) -> Option<PathBuf> {
    match s {
        Some(s) if !s.is_empty() => Some(PathBuf::from(s)),
        _ => None,
    }
}

fn toml_to_param(name: &str, v: &toml::Value, errors: &mut Vec<ConfigError>) -> ParamValue {
    match v {
        toml::Value::String(s) => ParamValue::Str(s.clone()),
        toml::Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                match item {
                    toml::Value::String(s) => out.push(s.clone()),
                    _ => {
                        errors.push(ConfigError::Other(format!(
                            "params.{name} array element must be a string"
                        )));
                    }
                }
            }
            ParamValue::Array(out)
        }
        _ => {
            errors.push(ConfigError::Other(format!(
                "params.{name} must be a string or array of strings"
            )));
            ParamValue::Str(String::new())
        }
    }
}

fn build_group(
    raw: raw::RawGroup,
    templates: &BTreeMap<String, types::CommandTemplate>,
    errors: &mut Vec<ConfigError>,
) -> types::Group {
    push_name_checks("group", &raw.name, false, errors);

    let vars = parse_pairs("group.vars", &raw.vars.unwrap_or_default(), errors);
    for (name, _) in &vars {
        check_scoped_var_name("group", name, errors);
    }
    let env_import = parse_pairs("group.env_import", &raw.env_import.unwrap_or_default(), errors);
    for (name, _) in &env_import {
        check_scoped_var_name("group", name, errors);
    }
    let env_vars = parse_pairs("group.env_vars", &raw.env_vars.unwrap_or_default(), errors);

    let env_allowed = match raw.env_allowed {
        None => types::EnvAllowedMode::Inherit,
        Some(names) => types::EnvAllowedMode::Explicit(names),
    };

    let cmd_allowed = resolve_cmd_allowed(&raw.name, raw.cmd_allowed.unwrap_or_default(), errors);

    let mut command_names = std::collections::HashSet::new();
    let mut commands = Vec::new();
    for raw_command in raw.commands {
        if !command_names.insert(raw_command.name.clone()) {
            errors.push(ConfigError::DuplicateName {
                kind: "command".to_string(),
                name: raw_command.name.clone(),
            });
        }
        if let Some(c) = build_command(raw_command, templates, errors) {
            commands.push(c);
        }
    }
    if commands.is_empty() {
        errors.push(ConfigError::MissingField {
            field: format!("groups[{}].commands", raw.name),
        });
    }

    types::Group {
        name: raw.name,
        description: raw.description,
        workdir: non_empty_path(raw.workdir),
        verify_files: raw.verify_files.unwrap_or_default(),
        vars,
        env_import,
        env_vars,
        env_allowed,
        cmd_allowed,
        commands,
    }
}

/// Entries may contain `%{...}`, but only global/group-scope names are
/// visible this early (no command scope, no `__runner_workdir` yet). Since
/// the common case has no references at all, we only attempt expansion when
/// one is present and otherwise just canonicalize the literal entry.
fn resolve_cmd_allowed(group: &str, raw: Vec<String>, errors: &mut Vec<ConfigError>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in raw {
        if crate::vars::token::scan_internal(&entry)
            .iter()
            .any(|p| matches!(p, crate::vars::token::Piece::Internal(_)))
        {
            // Left for the orchestrator: a cmd_allowed entry referencing a
            // variable is resolved per-group once VarScope exists, not here.
            // The literal (pre-expansion) form is recorded as a placeholder
            // and re-resolved at group start; load-time existence isn't
            // checkable yet.
            out.push(PathBuf::from(entry));
            continue;
        }
        match crate::path_resolve::resolve(&entry) {
            Ok(p) => out.push(p),
            Err(_) => errors.push(ConfigError::CmdAllowedMissing {
                path: PathBuf::from(format!("{group}:{entry}")),
            }),
        }
    }
    out
}

fn build_command(
    raw: raw::RawCommand,
    templates: &BTreeMap<String, types::CommandTemplate>,
    errors: &mut Vec<ConfigError>,
) -> Option<types::Command> {
    push_name_checks("command", &raw.name, false, errors);

    let vars = parse_pairs(
        &format!("{}.vars", raw.name),
        &raw.vars.clone().unwrap_or_default(),
        errors,
    );
    for (name, _) in &vars {
        check_scoped_var_name("command", name, errors);
    }
    let env_import = parse_pairs(
        &format!("{}.env_import", raw.name),
        &raw.env_import.clone().unwrap_or_default(),
        errors,
    );
    for (name, _) in &env_import {
        check_scoped_var_name("command", name, errors);
    }
    let env_vars = parse_pairs(
        &format!("{}.env_vars", raw.name),
        &raw.env_vars.clone().unwrap_or_default(),
        errors,
    );

    match (&raw.cmd, &raw.template) {
        (Some(_), Some(_)) => {
            errors.push(ConfigError::CmdAndTemplate {
                command: raw.name.clone(),
            });
            return None;
        }
        (None, None) => {
            errors.push(ConfigError::NeitherCmdNorTemplate {
                command: raw.name.clone(),
            });
            return None;
        }
        _ => {}
    }

    if raw.template.is_none() && raw.params.is_some() {
        errors.push(ConfigError::ParamsWithoutTemplate {
            command: raw.name.clone(),
        });
    }

    if let Some(template_name) = &raw.template {
        // Only `cmd`/`args` are truly forbidden on a templated command; see
        // DESIGN.md's "Template/command field conflict" decision.
        if raw.cmd.is_some() {
            errors.push(ConfigError::TemplateFieldConflict {
                command: raw.name.clone(),
                field: "cmd".to_string(),
            });
        }
        if raw.args.is_some() {
            errors.push(ConfigError::TemplateFieldConflict {
                command: raw.name.clone(),
                field: "args".to_string(),
            });
        }

        let Some(t) = templates.get(template_name) else {
            errors.push(ConfigError::UnknownTemplate {
                command: raw.name.clone(),
                template: template_name.clone(),
            });
            return None;
        };

        let mut params_map = std::collections::HashMap::new();
        for (k, v) in raw.params.clone().unwrap_or_default() {
            params_map.insert(k.clone(), toml_to_param(&k, &v, errors));
        }
        let params = Params(params_map);

        let cmd = match template::expand_scalar(&t.cmd, &params) {
            Ok(v) => v,
            Err(e) => {
                errors.push(ConfigError::Other(format!("{}: {e}", raw.name)));
                String::new()
            }
        };
        let mut args = Vec::new();
        for a in &t.args {
            match template::expand_arg_element(a, &params) {
                Ok(mut v) => args.append(&mut v),
                Err(e) => errors.push(ConfigError::Other(format!("{}: {e}", raw.name))),
            }
        }
        let mut template_env_vars = Vec::new();
        for (k, v) in &t.env_vars {
            match template::expand_scalar(v, &params) {
                Ok(expanded) => template_env_vars.push((k.clone(), expanded)),
                Err(e) => errors.push(ConfigError::Other(format!("{}: {e}", raw.name))),
            }
        }

        // vars: map merge, command wins on key collision.
        let mut merged_vars: Vec<(String, String)> = t.vars.clone();
        for (k, v) in &vars {
            if let Some(existing) = merged_vars.iter_mut().find(|(ek, _)| ek == k) {
                existing.1 = v.clone();
            } else {
                merged_vars.push((k.clone(), v.clone()));
            }
        }

        // env_import: union, command wins on LHS collision.
        let mut merged_env_import: Vec<(String, String)> = t.env_import.clone();
        for (k, v) in &env_import {
            if let Some(existing) = merged_env_import.iter_mut().find(|(ek, _)| ek == k) {
                existing.1 = v.clone();
            } else {
                merged_env_import.push((k.clone(), v.clone()));
            }
        }

        // env_vars, workdir, output_file, timeout, run_as_*, risk_level,
        // description: override-if-present-else-inherit.
        let final_env_vars = if !env_vars.is_empty() {
            env_vars
        } else {
            template_env_vars
        };
        // An explicit empty-string workdir on the command is a distinct
        // "unset" override (use cwd), not "absent" — it must not fall
        // through to the template's workdir (spec §4.5).
        let workdir = match &raw.workdir {
            Some(s) => non_empty_path(Some(s.clone())),
            None => t.workdir.clone(),
        };
        let output_file = raw.output_file.clone().or_else(|| t.output_file.clone());
        let timeout_seconds = raw.timeout_seconds.or(t.timeout_seconds);
        let run_as_user = raw.run_as_user.clone().or_else(|| t.run_as_user.clone());
        let run_as_group = raw.run_as_group.clone().or_else(|| t.run_as_group.clone());
        let risk_level = raw
            .risk_level
            .clone()
            .map(|s| parse_risk_level(Some(s), errors))
            .unwrap_or(t.risk_level);
        let description = raw.description.clone().or_else(|| t.description.clone());

        Some(types::Command {
            name: raw.name,
            cmd,
            args,
            vars: merged_vars,
            env_import: merged_env_import,
            env_vars: final_env_vars,
            workdir,
            timeout_seconds,
            run_as_user,
            run_as_group,
            risk_level,
            output_file,
            description,
        })
    } else {
        let risk_level = parse_risk_level(raw.risk_level, errors);
        Some(types::Command {
            name: raw.name,
            cmd: raw.cmd.unwrap_or_default(),
            args: raw.args.unwrap_or_default(),
            vars,
            env_import,
            env_vars,
            workdir: non_empty_path(raw.workdir),
            timeout_seconds: raw.timeout_seconds,
            run_as_user: raw.run_as_user,
            run_as_group: raw.run_as_group,
            risk_level,
            output_file: raw.output_file,
            description: raw.description,
        })
    }
}

/// Resolve the effective timeout for a command: command override, else
/// global default, else the system default (spec §4.9). `0` means unlimited
/// at any level and short-circuits the chain.
#[must_use]
pub fn effective_timeout(command: Option<u64>, global: Option<u64>) -> u64 {
    command
        .or(global)
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version = "1.0"

[[groups]]
name = "g1"

[[groups.commands]]
name = "c1"
cmd = "/bin/ls"
"#;

    #[test]
    fn loads_minimal_config() {
        let cfg = load_str(MINIMAL).unwrap();
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].commands[0].cmd, "/bin/ls");
        assert_eq!(cfg.groups[0].commands[0].risk_level, RiskLevel::Low);
    }

    #[test]
    fn rejects_wrong_version() {
        let text = MINIMAL.replace("1.0", "2.0");
        let err = load_str(&text).unwrap_err();
        match err {
            ConfigError::Multiple(errs) => {
                assert!(errs.iter().any(|e| matches!(e, ConfigError::VersionMismatch { .. })));
            }
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn rejects_skip_standard_paths_alias() {
        let text = MINIMAL.replacen(
            "version = \"1.0\"",
            "version = \"1.0\"\n[global]\nskip_standard_paths = true",
            1,
        );
        let err = load_str(&text).unwrap_err();
        match err {
            ConfigError::Multiple(errs) => {
                assert!(errs.iter().any(|e| matches!(e, ConfigError::UnknownOption { .. })));
            }
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn rejects_cmd_and_template_together() {
        let text = r#"
version = "1.0"

[command_templates.t1]
cmd = "/bin/echo"

[[groups]]
name = "g1"

[[groups.commands]]
name = "c1"
cmd = "/bin/ls"
template = "t1"
"#;
        let err = load_str(text).unwrap_err();
        match err {
            ConfigError::Multiple(errs) => {
                assert!(errs.iter().any(|e| matches!(e, ConfigError::CmdAndTemplate { .. })));
            }
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn template_command_expands_params() {
        let text = r#"
version = "1.0"

[command_templates.bk]
cmd = "/usr/bin/restic"
args = ["${@flags}", "backup", "${path}"]

[[groups]]
name = "g1"

[[groups.commands]]
name = "c1"
template = "bk"
params = { flags = ["-v", "-v"], path = "/data" }
"#;
        let cfg = load_str(text).unwrap();
        let cmd = &cfg.groups[0].commands[0];
        assert_eq!(cmd.cmd, "/usr/bin/restic");
        assert_eq!(cmd.args, vec!["-v", "-v", "backup", "/data"]);
    }

    #[test]
    fn template_rejects_internal_var_reference() {
        let text = r#"
version = "1.0"

[command_templates.t1]
cmd = "%{SECRET}/bin/tool"

[[groups]]
name = "g1"

[[groups.commands]]
name = "c1"
template = "t1"
"#;
        let err = load_str(text).unwrap_err();
        match err {
            ConfigError::Multiple(errs) => {
                assert!(errs
                    .iter()
                    .any(|e| matches!(e, ConfigError::TemplateReadsInternalVar { .. })));
            }
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn command_inherits_template_workdir_when_absent() {
        let text = r#"
version = "1.0"

[command_templates.t1]
cmd = "/bin/echo"
workdir = "/tmp"

[[groups]]
name = "g1"

[[groups.commands]]
name = "c1"
template = "t1"
"#;
        let cfg = load_str(text).unwrap();
        assert_eq!(cfg.groups[0].commands[0].workdir, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn explicit_empty_workdir_overrides_template_instead_of_inheriting() {
        let text = r#"
version = "1.0"

[command_templates.t1]
cmd = "/bin/echo"
workdir = "/tmp"

[[groups]]
name = "g1"

[[groups.commands]]
name = "c1"
template = "t1"
workdir = ""
"#;
        let cfg = load_str(text).unwrap();
        assert_eq!(cfg.groups[0].commands[0].workdir, None);
    }
}
