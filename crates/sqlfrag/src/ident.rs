//! SQL identifier validation.
//!
//! Identifiers cannot be bound as parameters, so they are spliced into the
//! code as double-quoted text. Only names matching
//! `[A-Za-z_][A-Za-z0-9_$-]*` are accepted; everything else is rejected
//! before it reaches any SQL text.

use crate::error::{SqlError, SqlResult};
use sha2::{Digest, Sha256};

/// Postgres truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Whether `name` is acceptable to [`Sql::identifier`](crate::Sql::identifier).
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first == '_' || first.is_ascii_alphabetic()) {
        return false;
    }
    chars.all(|c| c == '_' || c == '$' || c == '-' || c.is_ascii_alphanumeric())
}

pub(crate) fn check_identifier(name: &str) -> SqlResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(SqlError::InvalidIdentifier(name.to_string()))
    }
}

/// Double-quote a name that already passed [`check_identifier`].
pub(crate) fn quote(name: &str, out: &mut String) {
    out.push('"');
    out.push_str(name);
    out.push('"');
}

/// Shorten `identifier` to fit Postgres' length limit.
///
/// Names that fit are returned unchanged. Longer names keep a prefix and get
/// an 8 hex digit hash suffix so distinct long names stay distinct.
pub fn make_identifier(identifier: &str) -> String {
    if identifier.len() <= MAX_IDENTIFIER_LEN {
        return identifier.to_string();
    }
    let digest = hex::encode(Sha256::digest(identifier.as_bytes()));
    let mut cut = MAX_IDENTIFIER_LEN - 9;
    while !identifier.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &identifier[..cut], &digest[..8])
}

/// Conventional name for an index on `table(column)`.
pub fn make_index_name(table: &str, column: &str) -> String {
    make_identifier(&format!("{table}__{column}_index"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(is_valid_identifier("res_partner"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("amount$total"));
        assert!(is_valid_identifier("x-y"));
        assert!(is_valid_identifier("Table1"));
    }

    #[test]
    fn rejects_unsafe_names() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1table"));
        assert!(!is_valid_identifier("-dash"));
        assert!(!is_valid_identifier("my table"));
        assert!(!is_valid_identifier("a\"b"));
        assert!(!is_valid_identifier("bad name; DROP TABLE x"));
        assert!(!is_valid_identifier("schema.table"));
        assert!(!is_valid_identifier("café"));
    }

    #[test]
    fn check_returns_error_with_name() {
        let err = check_identifier("a;b").unwrap_err();
        assert!(matches!(err, SqlError::InvalidIdentifier(ref n) if n == "a;b"));
    }

    #[test]
    fn short_identifiers_are_kept() {
        assert_eq!(make_identifier("res_partner"), "res_partner");
        let exact = "a".repeat(MAX_IDENTIFIER_LEN);
        assert_eq!(make_identifier(&exact), exact);
    }

    #[test]
    fn long_identifiers_are_hashed() {
        let long = "x".repeat(100);
        let short = make_identifier(&long);
        assert_eq!(short.len(), MAX_IDENTIFIER_LEN);
        assert!(short.starts_with(&"x".repeat(54)));
        assert_eq!(&short[54..55], "_");

        let other = make_identifier(&format!("{}y", "x".repeat(99)));
        assert_ne!(short, other);
    }

    #[test]
    fn index_name_convention() {
        assert_eq!(
            make_index_name("res_partner", "name"),
            "res_partner__name_index"
        );
    }
}
