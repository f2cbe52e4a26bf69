//! Shared escape layer plus two disjoint token grammars: `%{name}` (internal
//! variables) and `${name}` / `${?name}` / `${@name}` (template parameters).
//!
//! Deliberately implemented as a single forward scan over the input rather
//! than regex substitution, which mis-handles adjacency and escapes (spec §9).

/// One piece of a scanned string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    /// `%{name}`
    Internal(String),
    /// `${name}`
    Param(String),
    /// `${?name}`
    ParamOptional(String),
    /// `${@name}`
    ParamSplat(String),
}

/// Scan for `%{name}` references, treating `${...}` as inert literal text.
/// `\%`, `\\`, `\$` are unescaped to their literal character here — this is
/// the one and only phase where escapes are consumed (spec §9: the escape
/// layer applies "after template phase", i.e. during variable expansion).
pub fn scan_internal(input: &str) -> Vec<Piece> {
    scan(input, true, false)
}

/// Scan for `${name}` / `${?name}` / `${@name}` references, treating `%{...}`
/// as inert literal text (it is substituted in the next phase). Escapes are
/// left untouched here, backslash and all, so a template field's `\%{NAME}`
/// survives into the variable-expansion phase intact and is unescaped there
/// exactly once — a template must never be able to read a caller's internal
/// variable, escaped or not.
pub fn scan_params(input: &str) -> Vec<Piece> {
    scan(input, false, true)
}

fn scan(input: &str, want_internal: bool, want_params: bool) -> Vec<Piece> {
    // Escapes are consumed only during the internal-variable phase; the
    // template-parameter phase must pass `\%`/`\\`/`\$` through untouched.
    let consume_escapes = want_internal;
    let chars: Vec<char> = input.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if consume_escapes && c == '\\' && i + 1 < chars.len() && matches!(chars[i + 1], '%' | '\\' | '$') {
            literal.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if want_internal && c == '%' && chars.get(i + 1) == Some(&'{') {
            if let Some((name, next)) = scan_braced(&chars, i + 2) {
                flush(&mut pieces, &mut literal);
                pieces.push(Piece::Internal(name));
                i = next;
                continue;
            }
        }
        if want_params && c == '$' && chars.get(i + 1) == Some(&'{') {
            let marker = chars.get(i + 2).copied();
            let (start, ctor): (usize, fn(String) -> Piece) = match marker {
                Some('?') => (i + 3, Piece::ParamOptional as fn(String) -> Piece),
                Some('@') => (i + 3, Piece::ParamSplat as fn(String) -> Piece),
                _ => (i + 2, Piece::Param as fn(String) -> Piece),
            };
            if let Some((name, next)) = scan_braced(&chars, start) {
                flush(&mut pieces, &mut literal);
                pieces.push(ctor(name));
                i = next;
                continue;
            }
        }
        literal.push(c);
        i += 1;
    }
    flush(&mut pieces, &mut literal);
    pieces
}

/// Scan a bare identifier followed by `}` starting at `start` (just past the
/// opening marker). Returns the identifier text and the index past the `}`.
fn scan_braced(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut j = start;
    while j < chars.len() && chars[j] != '}' {
        j += 1;
    }
    if j >= chars.len() {
        return None; // unterminated; caller falls back to literal text
    }
    let name: String = chars[start..j].iter().collect();
    Some((name, j + 1))
}

fn flush(pieces: &mut Vec<Piece>, literal: &mut String) {
    if !literal.is_empty() {
        pieces.push(Piece::Literal(std::mem::take(literal)));
    }
}

/// Check whether a name matches `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Raw scan used only to reject `%{...}` appearing in a template field
/// definition (spec §4.4): any unescaped `%{` sequence is forbidden there,
/// independent of whether the name inside is well-formed.
#[must_use]
pub fn contains_unescaped_internal_ref(input: &str) -> bool {
    scan_internal(input)
        .iter()
        .any(|p| matches!(p, Piece::Internal(_)))
}
