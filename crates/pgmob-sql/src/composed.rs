//! Typed statement parts and their composition.
//!
//! A statement is a flat sequence of [`Fragment`]s. Caller-supplied text can
//! only enter it as an [`Identifier`] (double-quoted) or a [`Literal`]
//! (escaped inline), or be bound as a parameter through a [`Placeholder`].
//! Raw [`Sql`] is for text written by this crate's authors.

use pgmob_core::error::{Error, Result, UsageErrorKind};
use pgmob_core::{Value, literal_sql, quote_ident};
use std::fmt;
use std::ops::{Add, Mul};

/// One typed part of a composed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Raw SQL text, emitted verbatim
    Sql(String),
    /// A possibly qualified identifier; each component is quoted
    Identifier(Vec<String>),
    /// A value rendered inline as an escaped literal
    Literal(Value),
    /// A bound parameter slot, rendered as `$n`
    Placeholder,
}

/// Raw SQL text, also used as a template for [`Sql::format`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sql(String);

/// A quoted identifier, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(Vec<String>);

/// A value rendered inline as a SQL literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal(Value);

/// A bound parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder;

/// A sequence of typed fragments.
///
/// Equality is structural: two statements are equal when they hold the same
/// fragments in the same order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Composed {
    parts: Vec<Fragment>,
}

/// Anything that can be placed into a statement.
///
/// Plain strings and numbers deliberately do not implement this; they have
/// to be wrapped in [`Identifier`] or [`Literal`] first.
pub trait Composable {
    fn compose(self) -> Composed;
}

impl Sql {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expand `{name}` placeholders from `args`.
    ///
    /// `{{` and `}}` produce literal braces. A placeholder without a
    /// matching argument, or an unterminated brace, is a usage error.
    ///
    /// ```
    /// use pgmob_sql::{Composable, Identifier, Sql};
    ///
    /// let stmt = Sql::new("ALTER ROLE {role} RENAME TO {name}")
    ///     .format(&[
    ///         ("role", Identifier::new("foo").compose()),
    ///         ("name", Identifier::new("bar").compose()),
    ///     ])
    ///     .unwrap();
    /// assert_eq!(stmt.to_string(), r#"ALTER ROLE "foo" RENAME TO "bar""#);
    /// ```
    pub fn format(&self, args: &[(&str, Composed)]) -> Result<Composed> {
        let template_error = |message: String| {
            Error::usage(
                UsageErrorKind::Template,
                format!("{message} in template '{}'", self.0),
            )
        };

        let mut out = Composed::default();
        let mut text = String::new();
        let mut chars = self.0.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(template_error("unterminated '{'".to_string()));
                    }
                    let value = args
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| value)
                        .ok_or_else(|| template_error(format!("no value for '{{{name}}}'")))?;
                    if !text.is_empty() {
                        out.parts.push(Fragment::Sql(std::mem::take(&mut text)));
                    }
                    out.parts.extend(value.parts.iter().cloned());
                }
                '}' => return Err(template_error("unmatched '}'".to_string())),
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            out.parts.push(Fragment::Sql(text));
        }
        Ok(out)
    }

    /// Join `items` with this fragment as the separator.
    ///
    /// ```
    /// use pgmob_sql::{Identifier, Sql};
    ///
    /// let cols = Sql::new(", ").join([Identifier::new("a"), Identifier::new("b")]);
    /// assert_eq!(cols.to_string(), r#""a", "b""#);
    /// ```
    pub fn join<I>(&self, items: I) -> Composed
    where
        I: IntoIterator,
        I::Item: Composable,
    {
        let mut out = Composed::default();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                out.parts.push(Fragment::Sql(self.0.clone()));
            }
            out.parts.extend(item.compose().parts);
        }
        out
    }
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// A dotted identifier such as `schema.table`.
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self(vec![schema.into(), name.into()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl Literal {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl Composed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parts(&self) -> &[Fragment] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of bound parameter slots.
    pub fn placeholder_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, Fragment::Placeholder))
            .count()
    }

    /// Render to driver text, numbering placeholders `$1..$n`.
    pub fn render(&self) -> String {
        let mut sql = String::new();
        let mut slot = 0;
        for part in &self.parts {
            match part {
                Fragment::Sql(text) => sql.push_str(text),
                Fragment::Identifier(names) => {
                    let quoted: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
                    sql.push_str(&quoted.join("."));
                }
                Fragment::Literal(value) => sql.push_str(&literal_sql(value)),
                Fragment::Placeholder => {
                    slot += 1;
                    sql.push('$');
                    sql.push_str(&slot.to_string());
                }
            }
        }
        sql
    }

    /// Render for display or export. Statements with bound parameter slots
    /// cannot be shown standalone and are rejected.
    pub fn as_script(&self) -> Result<String> {
        if self.placeholder_count() > 0 {
            return Err(Error::usage(
                UsageErrorKind::Parameters,
                format!("statement has bound parameters: {}", self.render()),
            ));
        }
        Ok(self.render())
    }
}

impl fmt::Display for Composed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Composable for Composed {
    fn compose(self) -> Composed {
        self
    }
}

impl Composable for &Composed {
    fn compose(self) -> Composed {
        self.clone()
    }
}

impl Composable for Sql {
    fn compose(self) -> Composed {
        Composed {
            parts: vec![Fragment::Sql(self.0)],
        }
    }
}

impl Composable for Identifier {
    fn compose(self) -> Composed {
        Composed {
            parts: vec![Fragment::Identifier(self.0)],
        }
    }
}

impl Composable for &Identifier {
    fn compose(self) -> Composed {
        self.clone().compose()
    }
}

impl Composable for Literal {
    fn compose(self) -> Composed {
        Composed {
            parts: vec![Fragment::Literal(self.0)],
        }
    }
}

impl Composable for Placeholder {
    fn compose(self) -> Composed {
        Composed {
            parts: vec![Fragment::Placeholder],
        }
    }
}

impl<T: Composable> Add<T> for Composed {
    type Output = Composed;

    fn add(mut self, rhs: T) -> Composed {
        self.parts.extend(rhs.compose().parts);
        self
    }
}

macro_rules! impl_add_for_part {
    ($($part:ty),+) => {
        $(
            impl<T: Composable> Add<T> for $part {
                type Output = Composed;

                fn add(self, rhs: T) -> Composed {
                    self.compose() + rhs
                }
            }
        )+
    };
}

impl_add_for_part!(Sql, Identifier, Literal, Placeholder);

/// Repeat a statement `n` times.
impl Mul<usize> for Composed {
    type Output = Composed;

    fn mul(self, n: usize) -> Composed {
        let mut parts = Vec::with_capacity(self.parts.len() * n);
        for _ in 0..n {
            parts.extend(self.parts.iter().cloned());
        }
        Composed { parts }
    }
}

impl Mul<usize> for Sql {
    type Output = Composed;

    fn mul(self, n: usize) -> Composed {
        self.compose() * n
    }
}

impl Mul<usize> for Placeholder {
    type Output = Composed;

    fn mul(self, n: usize) -> Composed {
        self.compose() * n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql;

    #[test]
    fn test_format_identifiers_and_literals() {
        let stmt = sql!(
            "ALTER ROLE {role} CONNECTION LIMIT {limit}",
            role = Identifier::new("foo"),
            limit = Literal::new(10),
        )
        .unwrap();
        assert_eq!(stmt.render(), r#"ALTER ROLE "foo" CONNECTION LIMIT 10"#);
        assert_eq!(
            stmt.parts(),
            &[
                Fragment::Sql("ALTER ROLE ".into()),
                Fragment::Identifier(vec!["foo".into()]),
                Fragment::Sql(" CONNECTION LIMIT ".into()),
                Fragment::Literal(Value::Int(10)),
            ]
        );
    }

    #[test]
    fn test_format_escapes_and_errors() {
        let stmt = sql!("SELECT '{{}}' || {v}", v = Literal::new("x")).unwrap();
        assert_eq!(stmt.render(), "SELECT '{}' || 'x'");

        let missing = sql!("DROP TABLE {table}").unwrap_err();
        assert_eq!(missing.usage_kind(), Some(UsageErrorKind::Template));
        assert!(Sql::new("DROP {table").format(&[]).is_err());
        assert!(Sql::new("DROP }").format(&[]).is_err());
    }

    #[test]
    fn test_qualified_identifier_quoting() {
        let stmt = sql!(
            "DROP TABLE {fqn}",
            fqn = Identifier::qualified("my schema", "ta\"b")
        )
        .unwrap();
        assert_eq!(stmt.render(), r#"DROP TABLE "my schema"."ta""b""#);
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Sql::new("asd").compose(), Sql::new("asd").compose());
        assert_ne!(Sql::new("asd").compose(), Identifier::new("asd").compose());
        assert_ne!(Sql::new("ab").compose(), Sql::new("a") + Sql::new("b"));
        assert_eq!(
            Sql::new("a") + Identifier::new("b"),
            Sql::new("a").compose() + Identifier::new("b")
        );
    }

    #[test]
    fn test_concatenation_and_repetition() {
        let stmt = Sql::new("SELECT ") + Literal::new(1) + Sql::new(", ") + Placeholder;
        assert_eq!(stmt.render(), "SELECT 1, $1");

        let repeated = (Sql::new("x") + Placeholder) * 3;
        assert_eq!(repeated.render(), "x$1x$2x$3");
        assert_eq!(repeated.placeholder_count(), 3);
        assert!((Sql::new("x") * 0).is_empty());
    }

    #[test]
    fn test_join() {
        let stmts = vec![
            sql!("ALTER TABLE {t} OWNER TO {o}", t = Identifier::new("a"), o = Identifier::new("r")).unwrap(),
            sql!("ALTER TABLE {t} OWNER TO {o}", t = Identifier::new("b"), o = Identifier::new("r")).unwrap(),
        ];
        let batch = Sql::new(";\n").join(stmts);
        assert_eq!(
            batch.render(),
            "ALTER TABLE \"a\" OWNER TO \"r\";\nALTER TABLE \"b\" OWNER TO \"r\""
        );
        assert!(Sql::new(", ").join(Vec::<Composed>::new()).is_empty());
    }

    #[test]
    fn test_as_script_rejects_placeholders() {
        let stmt = Sql::new("SELECT nextval(") + Placeholder + Sql::new(")");
        assert_eq!(
            stmt.as_script().unwrap_err().usage_kind(),
            Some(UsageErrorKind::Parameters)
        );
        assert_eq!(
            (Sql::new("SELECT ") + Literal::new("o'k")).as_script().unwrap(),
            "SELECT 'o''k'"
        );
    }
}
