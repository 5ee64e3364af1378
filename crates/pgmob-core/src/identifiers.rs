//! Identifier and literal quoting.
//!
//! These are the only two ways text from a caller ends up inside a
//! statement: as a double-quoted identifier or as a single-quoted literal.

use crate::value::Value;
use std::fmt::Write as _;

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// # Examples
///
/// ```
/// use pgmob_core::quote_ident;
///
/// assert_eq!(quote_ident("tab1"), "\"tab1\"");
/// assert_eq!(quote_ident("my\"tab"), "\"my\"\"tab\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal.
///
/// Assumes `standard_conforming_strings = on` (the server default since 9.1),
/// so only single quotes need escaping. Strings containing a backslash are
/// emitted in `E''` form with backslashes doubled, which is valid under
/// either setting.
///
/// ```
/// use pgmob_core::quote_literal;
///
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// assert_eq!(quote_literal(r"C:\tmp"), r"E'C:\\tmp'");
/// ```
pub fn quote_literal(text: &str) -> String {
    let escaped = text.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

/// Render a value as an inline SQL literal.
pub fn literal_sql(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Double(v) if v.is_finite() => v.to_string(),
        Value::Double(v) => format!("'{}'::float8", v),
        Value::Text(s) => quote_literal(s),
        Value::Bytes(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 12);
            out.push_str("'\\x");
            for b in bytes {
                let _ = write!(out, "{:02x}", b);
            }
            out.push_str("'::bytea");
            out
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(literal_sql).collect();
            format!("ARRAY[{}]", inner.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_simple() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("public"), "\"public\"");
    }

    #[test]
    fn test_quote_ident_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_ident("\""), "\"\"\"\"");
    }

    #[test]
    fn test_quote_ident_injection() {
        let quoted = quote_ident("x\"; DROP TABLE users; --");
        assert_eq!(quoted, "\"x\"\"; DROP TABLE users; --\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("o'neil"), "'o''neil'");
        assert_eq!(quote_literal("a\\'b"), "E'a\\\\''b'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_literal_sql_values() {
        assert_eq!(literal_sql(&Value::Null), "NULL");
        assert_eq!(literal_sql(&Value::Bool(true)), "true");
        assert_eq!(literal_sql(&Value::Int(-1)), "-1");
        assert_eq!(literal_sql(&Value::BigInt(102)), "102");
        assert_eq!(literal_sql(&Value::Text("md5".into())), "'md5'");
        assert_eq!(literal_sql(&Value::Bytes(vec![0xde, 0xad])), "'\\xdead'::bytea");
        assert_eq!(
            literal_sql(&Value::Array(vec![Value::Text("a".into()), Value::Int(1)])),
            "ARRAY['a', 1]"
        );
    }
}
