//! Internal-variable resolution (C4, variable-expansion phase).
//!
//! A variable's definitions are kept as a per-name chain, ordered from the
//! outermost (global) scope to the innermost (command) scope. Ordinary
//! lookups use the innermost entry ("lower scope wins"); a definition whose
//! own right-hand side references its own name resolves against the next
//! entry down the chain instead of itself, which is what makes
//! `PATH=/custom:%{PATH}`-style self-reference-across-layers legal rather
//! than a cycle (spec §3 Invariants, §9 Design Notes).

pub mod token;

use crate::error::ExpansionError;
use std::collections::HashMap;

/// Where a variable's value comes from.
#[derive(Debug, Clone)]
pub enum VarSource {
    /// A literal definition (from `vars` or a system-provided internal);
    /// may itself contain further `%{...}` references.
    Literal(String),
    /// A value imported from the process environment (`env_import`); treated
    /// as a terminal string, never re-scanned for `%{...}`.
    FromEnv(String),
}

/// The resolvable set of internal variables for one expansion context
/// (one command, or the global/group scope when expanding their own fields).
#[derive(Debug, Default)]
pub struct VarScope {
    chains: HashMap<String, Vec<VarSource>>,
}

/// One scope layer's contribution, in definition order. Built by config
/// loading from `vars =` and `env_import =` entries (already merged into one
/// ordered list per the "both populate the same internal-variable namespace"
/// rule in DESIGN.md).
pub type Layer = Vec<(String, VarSource)>;

impl VarScope {
    /// Build a scope from layers ordered outermost (global) to innermost
    /// (command). Later layers extend each name's chain.
    #[must_use]
    pub fn build(layers: impl IntoIterator<Item = Layer>) -> Self {
        let mut chains: HashMap<String, Vec<VarSource>> = HashMap::new();
        for layer in layers {
            for (name, source) in layer {
                chains.entry(name).or_default().push(source);
            }
        }
        Self { chains }
    }

    /// Insert a system-provided internal variable as the outermost
    /// (lowest-precedence) entry for its name, so user definitions can still
    /// shadow it but never collide (reserved-prefix names are rejected
    /// elsewhere at load time).
    pub fn with_system(mut self, name: &str, value: impl Into<String>) -> Self {
        self.chains
            .entry(name.to_string())
            .or_default()
            .insert(0, VarSource::Literal(value.into()));
        self
    }

    /// Expand every `%{name}` occurrence in `input`. Returns an error on the
    /// first undefined reference or cycle encountered.
    pub fn expand(&self, input: &str) -> Result<String, ExpansionError> {
        let mut cache: HashMap<(String, usize), String> = HashMap::new();
        let mut on_path: Vec<(String, usize)> = Vec::new();
        self.expand_pieces(input, &mut cache, &mut on_path)
    }

    fn expand_pieces(
        &self,
        input: &str,
        cache: &mut HashMap<(String, usize), String>,
        on_path: &mut Vec<(String, usize)>,
    ) -> Result<String, ExpansionError> {
        let mut out = String::new();
        for piece in token::scan_internal(input) {
            match piece {
                token::Piece::Literal(s) => out.push_str(&s),
                token::Piece::Internal(name) => {
                    out.push_str(&self.resolve(&name, 0, cache, on_path)?);
                }
                // `${...}` forms are inert in this grammar; pass through
                // verbatim (non-template fields never use them).
                token::Piece::Param(n) => out.push_str(&format!("${{{n}}}")),
                token::Piece::ParamOptional(n) => out.push_str(&format!("${{?{n}}}")),
                token::Piece::ParamSplat(n) => out.push_str(&format!("${{@{n}}}")),
            }
        }
        Ok(out)
    }

    /// Resolve `name`, skipping the outermost `skip` definitions in its
    /// chain (skip=0 means "the innermost/current" definition).
    fn resolve(
        &self,
        name: &str,
        skip: usize,
        cache: &mut HashMap<(String, usize), String>,
        on_path: &mut Vec<(String, usize)>,
    ) -> Result<String, ExpansionError> {
        let key = (name.to_string(), skip);
        if let Some(v) = cache.get(&key) {
            return Ok(v.clone());
        }
        if on_path.contains(&key) {
            return Err(ExpansionError::Cycle {
                name: name.to_string(),
            });
        }

        let chain = self
            .chains
            .get(name)
            .ok_or_else(|| ExpansionError::UndefinedVariable {
                name: name.to_string(),
            })?;
        if skip >= chain.len() {
            return Err(ExpansionError::UndefinedVariable {
                name: name.to_string(),
            });
        }
        let idx = chain.len() - 1 - skip;
        let source = &chain[idx];

        let value = match source {
            VarSource::FromEnv(v) => v.clone(),
            VarSource::Literal(raw) => {
                on_path.push(key.clone());
                let raw = raw.clone();
                let mut out = String::new();
                for piece in token::scan_internal(&raw) {
                    match piece {
                        token::Piece::Literal(s) => out.push_str(&s),
                        token::Piece::Internal(ref_name) => {
                            // A self-reference shadows to the next entry down
                            // the chain; any other name resolves from its own
                            // innermost entry.
                            let next_skip = if ref_name == name { skip + 1 } else { 0 };
                            out.push_str(&self.resolve(&ref_name, next_skip, cache, on_path)?);
                        }
                        token::Piece::Param(n) => out.push_str(&format!("${{{n}}}")),
                        token::Piece::ParamOptional(n) => out.push_str(&format!("${{?{n}}}")),
                        token::Piece::ParamSplat(n) => out.push_str(&format!("${{@{n}}}")),
                    }
                }
                on_path.pop();
                out
            }
        };

        cache.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(pairs: &[(&str, &str)]) -> Layer {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), VarSource::Literal(v.to_string())))
            .collect()
    }

    #[test]
    fn simple_expansion() {
        let scope = VarScope::build([layer(&[("GREETING", "hello"), ("MSG", "%{GREETING} world")])]);
        assert_eq!(scope.expand("%{MSG}!").unwrap(), "hello world!");
    }

    #[test]
    fn undefined_reference_is_fatal() {
        let scope = VarScope::build([layer(&[])]);
        let err = scope.expand("%{NOPE}").unwrap_err();
        assert!(matches!(err, ExpansionError::UndefinedVariable { .. }));
    }

    #[test]
    fn genuine_cycle_is_rejected() {
        let scope = VarScope::build([layer(&[("A", "%{B}"), ("B", "%{A}")])]);
        let err = scope.expand("%{A}").unwrap_err();
        assert!(matches!(err, ExpansionError::Cycle { .. }));
    }

    #[test]
    fn self_reference_across_layers_is_not_a_cycle() {
        let mut global_layer: Layer = Vec::new();
        global_layer.push(("PATH".to_string(), VarSource::FromEnv("/usr/bin".to_string())));
        let command_layer = layer(&[("PATH", "/opt/bin:%{PATH}")]);
        let scope = VarScope::build([global_layer, command_layer]);
        assert_eq!(scope.expand("%{PATH}").unwrap(), "/opt/bin:/usr/bin");
    }

    #[test]
    fn system_vars_are_identical_across_contexts() {
        let a = VarScope::default().with_system("__runner_pid", "42");
        let b = VarScope::default().with_system("__runner_pid", "42");
        assert_eq!(
            a.expand("%{__runner_pid}").unwrap(),
            b.expand("%{__runner_pid}").unwrap()
        );
    }

    #[test]
    fn round_trip_leaves_no_tokens_on_success() {
        let scope = VarScope::build([layer(&[("A", "x")])]);
        let expanded = scope.expand("%{A}-y").unwrap();
        assert_eq!(scope.expand(&expanded).unwrap(), expanded);
    }
}
