//! Environment filter (C6).
//!
//! Builds the child process environment from scratch: the host process
//! environment is never inherited wholesale. Generalizes the teacher's
//! `stripped_env_vars`/`is_sensitive_env` denylist in `process.rs` from a
//! denylist into the spec's allowlist model.

use crate::error::EnvError;
use crate::vars::token::is_valid_name;
use std::collections::HashMap;

const RESERVED_PREFIX: &str = "__runner_";

/// Build the final child environment.
///
/// `env_allowed` is the scope's already-resolved effective set (inheritance
/// already applied by [`crate::config::types::EnvAllowedMode::resolve`]).
/// `env_var_levels` is the already variable-expanded `env_vars` lists, one
/// per scope in precedence order (global, then group, then command): each
/// level overlays the previous one (later wins), and only a repeated key
/// *within the same level* is fatal (spec §4.6) — a command legitimately
/// overriding a global/group key is the normal case, not a collision.
pub fn build(
    host_env: &HashMap<String, String>,
    env_allowed: &[String],
    env_var_levels: &[&[(String, String)]],
) -> Result<HashMap<String, String>, EnvError> {
    let mut out = HashMap::new();

    for name in env_allowed {
        if let Some(value) = host_env.get(name) {
            out.insert(name.clone(), value.clone());
        }
    }

    for level in env_var_levels {
        let mut seen_this_level = std::collections::HashSet::new();
        for (name, value) in *level {
            if !is_valid_name(name) {
                return Err(EnvError::InvalidName {
                    name: name.clone(),
                });
            }
            if name.starts_with(RESERVED_PREFIX) {
                return Err(EnvError::ReservedPrefix {
                    name: name.clone(),
                });
            }
            if !seen_this_level.insert(name.clone()) {
                return Err(EnvError::Duplicate {
                    name: name.clone(),
                });
            }
            out.insert(name.clone(), value.clone());
        }
    }

    Ok(out)
}

/// Check that every `SYSTEM` name referenced by `env_import` is present in
/// the effective `env_allowed` set (spec §4.4 "imports ... legal only if the
/// SYSTEM name appears in the effective env_allowed").
pub fn check_imports_allowed(env_import: &[(String, String)], env_allowed: &[String]) -> Result<(), EnvError> {
    for (_, system_name) in env_import {
        if !env_allowed.iter().any(|n| n == system_name) {
            return Err(EnvError::ImportNotAllowed {
                name: system_name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn only_allowed_names_pass_through() {
        let h = host(&[("PATH", "/usr/bin"), ("SECRET", "x")]);
        let out = build(&h, &["PATH".to_string()], &[]).unwrap();
        assert_eq!(out.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert!(!out.contains_key("SECRET"));
    }

    #[test]
    fn env_vars_overlay_and_override() {
        let h = host(&[("PATH", "/usr/bin")]);
        let level: Vec<(String, String)> = vec![("PATH".to_string(), "/opt/bin".to_string())];
        let out = build(&h, &["PATH".to_string()], &[&level]).unwrap();
        assert_eq!(out.get("PATH").map(String::as_str), Some("/opt/bin"));
    }

    #[test]
    fn reserved_prefix_in_env_vars_is_rejected() {
        let h = HashMap::new();
        let level: Vec<(String, String)> = vec![("__runner_x".to_string(), "1".to_string())];
        let err = build(&h, &[], &[&level]).unwrap_err();
        assert!(matches!(err, EnvError::ReservedPrefix { .. }));
    }

    #[test]
    fn duplicate_env_var_name_within_one_level_is_rejected() {
        let h = HashMap::new();
        let level: Vec<(String, String)> = vec![
            ("A".to_string(), "1".to_string()),
            ("A".to_string(), "2".to_string()),
        ];
        let err = build(&h, &[], &[&level]).unwrap_err();
        assert!(matches!(err, EnvError::Duplicate { .. }));
    }

    #[test]
    fn same_key_across_levels_overrides_rather_than_collides() {
        let h = HashMap::new();
        let global: Vec<(String, String)> = vec![("LOG_LEVEL".to_string(), "info".to_string())];
        let command: Vec<(String, String)> = vec![("LOG_LEVEL".to_string(), "debug".to_string())];
        let out = build(&h, &[], &[&global, &command]).unwrap();
        assert_eq!(out.get("LOG_LEVEL").map(String::as_str), Some("debug"));
    }

    #[test]
    fn import_of_disallowed_name_is_rejected() {
        let err = check_imports_allowed(&[("path".to_string(), "PATH".to_string())], &[]).unwrap_err();
        assert!(matches!(err, EnvError::ImportNotAllowed { .. }));
    }
}
