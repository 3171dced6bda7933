//! printf-style template scanning.
//!
//! Templates understand exactly three `%` sequences:
//!
//! - `%s` — positional placeholder
//! - `%(name)s` — named placeholder
//! - `%%` — a literal percent sign
//!
//! Any other `%` is rejected with [`SqlError::MalformedTemplate`]. Escapes are
//! kept as `%%` in composed code, so code produced by this crate is always in
//! the driver's `format` paramstyle.

use crate::error::{SqlError, SqlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    Text(&'a str),
    Escape,
    Positional,
    Named(&'a str),
}

/// Split a template into text runs and `%` sequences.
pub(crate) fn scan(template: &str) -> SqlResult<Vec<Piece<'_>>> {
    let bytes = template.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        if start < i {
            pieces.push(Piece::Text(&template[start..i]));
        }
        match bytes.get(i + 1) {
            Some(b's') => {
                pieces.push(Piece::Positional);
                i += 2;
            }
            Some(b'%') => {
                pieces.push(Piece::Escape);
                i += 2;
            }
            Some(b'(') => {
                let Some(close) = template[i + 2..].find(')') else {
                    return Err(SqlError::malformed(i, "unterminated '%(' placeholder"));
                };
                let name_end = i + 2 + close;
                let name = &template[i + 2..name_end];
                if name.is_empty() {
                    return Err(SqlError::malformed(i, "empty placeholder name '%()s'"));
                }
                if bytes.get(name_end + 1) != Some(&b's') {
                    return Err(SqlError::malformed(
                        i,
                        format!("placeholder '%({name})' must be followed by 's'"),
                    ));
                }
                pieces.push(Piece::Named(name));
                i = name_end + 2;
            }
            Some(_) => {
                // `i + 1` is a char boundary because `%` is ASCII.
                let c = template[i + 1..].chars().next().unwrap_or('%');
                return Err(SqlError::malformed(
                    i,
                    format!("unsupported conversion '%{c}' (escape literal '%' as '%%')"),
                ));
            }
            None => {
                return Err(SqlError::malformed(
                    i,
                    "incomplete format at end of template (escape literal '%' as '%%')",
                ));
            }
        }
        start = i;
    }
    if start < bytes.len() {
        pieces.push(Piece::Text(&template[start..]));
    }
    Ok(pieces)
}

/// Count `%s` placeholders in code produced by this crate.
///
/// Unknown `%` sequences are skipped rather than rejected.
pub fn placeholder_count(code: &str) -> usize {
    let bytes = code.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if bytes.get(i + 1) == Some(&b's') {
                count += 1;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}

/// Check that a template carries no placeholders at all.
pub(crate) fn validate_literal(template: &str) -> SqlResult<()> {
    let pieces = scan(template)?;
    let placeholders = pieces
        .iter()
        .filter(|p| matches!(p, Piece::Positional | Piece::Named(_)))
        .count();
    if placeholders > 0 {
        return Err(SqlError::mismatch(format!(
            "template has {placeholders} placeholder(s) but no arguments were given"
        )));
    }
    Ok(())
}

/// Replace each `%s` of `template` with the matching entry of `codes`.
pub(crate) fn substitute<S: AsRef<str>>(template: &str, codes: &[S]) -> SqlResult<String> {
    let pieces = scan(template)?;

    let mut positional = 0;
    for piece in &pieces {
        match piece {
            Piece::Positional => positional += 1,
            Piece::Named(name) => {
                return Err(SqlError::mismatch(format!(
                    "named placeholder '%({name})s' used with positional arguments"
                )));
            }
            Piece::Text(_) | Piece::Escape => {}
        }
    }
    if positional != codes.len() {
        return Err(SqlError::mismatch(format!(
            "template has {positional} placeholder(s) but {} argument(s) were given",
            codes.len()
        )));
    }

    let extra: usize = codes.iter().map(|c| c.as_ref().len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut codes = codes.iter();
    for piece in pieces {
        match piece {
            Piece::Text(s) => out.push_str(s),
            Piece::Escape => out.push_str("%%"),
            Piece::Positional => {
                if let Some(code) = codes.next() {
                    out.push_str(code.as_ref());
                }
            }
            Piece::Named(_) => {}
        }
    }
    Ok(out)
}

/// Rewrite `%(name)s` placeholders into `%s`.
///
/// Returns the positional template and, for each placeholder in order of
/// appearance, the index `lookup` resolved its name to. A name may appear
/// several times; names `lookup` knows but the template never uses are fine.
pub(crate) fn named_to_positional(
    template: &str,
    lookup: impl Fn(&str) -> Option<usize>,
) -> SqlResult<(String, Vec<usize>)> {
    let pieces = scan(template)?;
    let mut out = String::with_capacity(template.len());
    let mut order = Vec::new();

    for piece in pieces {
        match piece {
            Piece::Text(s) => out.push_str(s),
            Piece::Escape => out.push_str("%%"),
            Piece::Positional => {
                return Err(SqlError::mismatch(
                    "positional placeholder '%s' used with named arguments",
                ));
            }
            Piece::Named(name) => {
                let Some(index) = lookup(name) else {
                    return Err(SqlError::mismatch(format!(
                        "no value given for named placeholder '%({name})s'"
                    )));
                };
                order.push(index);
                out.push_str("%s");
            }
        }
    }
    Ok((out, order))
}
