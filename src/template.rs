//! Template parameter substitution (C5, template-expansion phase).
//!
//! Runs before variable expansion (C4): `${name}` / `${?name}` / `${@name}`
//! tokens in a template's fields are replaced using the calling command's
//! `params`. Any `%{...}` produced by a param's own value is left untouched
//! for the next phase.

use crate::vars::token::{self, Piece};
use std::collections::HashMap;

use crate::error::ExpansionError;

/// A template parameter value supplied by a command's `params` table.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Str(String),
    Array(Vec<String>),
}

/// The `params` table passed to a templated command.
#[derive(Debug, Clone, Default)]
pub struct Params(pub HashMap<String, ParamValue>);

impl Params {
    fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    fn get_string(&self, name: &str) -> Result<String, ExpansionError> {
        match self.get(name) {
            None => Err(ExpansionError::UndefinedParam {
                name: name.to_string(),
            }),
            Some(ParamValue::Str(s)) => Ok(s.clone()),
            Some(ParamValue::Array(_)) => Err(ExpansionError::ParamNotString {
                name: name.to_string(),
            }),
        }
    }

    fn is_absent_or_empty(&self, name: &str) -> bool {
        match self.get(name) {
            None => true,
            Some(ParamValue::Str(s)) => s.is_empty(),
            Some(ParamValue::Array(a)) => a.is_empty(),
        }
    }

    fn get_array(&self, name: &str) -> Result<Vec<String>, ExpansionError> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(ParamValue::Array(a)) => Ok(a.clone()),
            Some(ParamValue::Str(_)) => Err(ExpansionError::ParamNotArray {
                name: name.to_string(),
            }),
        }
    }
}

/// Expand a scalar template field (`cmd`, `workdir`, `output_file`, an
/// `env_vars` value). `${?name}` falls back to an empty substitution rather
/// than dropping anything, since there is no containing argv element here.
pub fn expand_scalar(raw: &str, params: &Params) -> Result<String, ExpansionError> {
    let mut out = String::new();
    for piece in token::scan_params(raw) {
        match piece {
            Piece::Literal(s) => out.push_str(&s),
            Piece::Param(name) => out.push_str(&params.get_string(&name)?),
            Piece::ParamOptional(name) => {
                if !params.is_absent_or_empty(&name) {
                    out.push_str(&params.get_string(&name)?);
                }
            }
            Piece::ParamSplat(name) => {
                return Err(ExpansionError::ParamNotString { name });
            }
            // `%{...}` is inert here; re-emit it verbatim for phase 2.
        }
    }
    Ok(out)
}

/// Expand one `args` element into zero or more final argv elements.
///
/// - A lone `${@name}` splices the named array's strings at this position.
/// - Any `${?name}` in the element whose param is absent or empty drops the
///   *entire* element.
/// - Otherwise, ordinary substitution yields exactly one element.
pub fn expand_arg_element(raw: &str, params: &Params) -> Result<Vec<String>, ExpansionError> {
    let pieces = token::scan_params(raw);

    if let [Piece::ParamSplat(name)] = pieces.as_slice() {
        return params.get_array(name);
    }

    for piece in &pieces {
        if let Piece::ParamOptional(name) = piece {
            if params.is_absent_or_empty(name) {
                return Ok(Vec::new());
            }
        }
        if let Piece::ParamSplat(name) = piece {
            return Err(ExpansionError::ParamNotString {
                name: name.clone(),
            });
        }
    }

    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Literal(s) => out.push_str(&s),
            Piece::Param(name) | Piece::ParamOptional(name) => {
                out.push_str(&params.get_string(&name)?);
            }
            Piece::ParamSplat(_) => unreachable!("handled above"),
        }
    }
    Ok(vec![out])
}

/// Validate that a template field definition contains no unescaped
/// `%{...}` reference (spec §4.4: templates must not directly read caller
/// variables; values flow in only through `params`).
#[must_use]
pub fn field_reads_internal_var(raw: &str) -> bool {
    token::contains_unescaped_internal_ref(raw)
}
