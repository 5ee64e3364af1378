//! Statement construction for pgmob.
//!
//! `pgmob-sql` is the **statement layer**. It turns templates and typed
//! parts into statements that are only rendered to text at the execution
//! boundary, and it holds the versioned catalog listing queries.
//!
//! - **Typed parts**: [`Sql`], [`Identifier`], [`Literal`], [`Placeholder`]
//! - **Composition**: `+`, `*`, [`Sql::join`], [`Sql::format`] and [`sql!`]
//! - **Registry**: [`QueryRegistry`] picks the listing for a server version

pub mod composed;
pub mod registry;
pub mod statement;

pub use composed::{Composable, Composed, Fragment, Identifier, Literal, Placeholder, Sql};
pub use registry::{CatalogQuery, QueryRegistry, filtered};
pub use statement::Statement;

/// Expand a template with named, typed arguments.
///
/// Evaluates to `Result<Composed>`. Arguments must implement [`Composable`],
/// so bare strings are rejected at compile time:
///
/// ```compile_fail
/// let name = "tab1";
/// let _ = pgmob_sql::sql!("DROP TABLE {table}", table = name);
/// ```
///
/// # Example
///
/// ```
/// use pgmob_sql::{Identifier, sql};
///
/// let stmt = sql!(
///     "ALTER TABLE {table} OWNER TO {owner}",
///     table = Identifier::qualified("app", "orders"),
///     owner = Identifier::new("alice"),
/// )
/// .unwrap();
/// assert_eq!(stmt.to_string(), r#"ALTER TABLE "app"."orders" OWNER TO "alice""#);
/// ```
#[macro_export]
macro_rules! sql {
    ($template:expr $(,)?) => {
        $crate::Sql::new($template).format(&[])
    };
    ($template:expr, $($name:ident = $value:expr),+ $(,)?) => {
        $crate::Sql::new($template).format(&[
            $((stringify!($name), $crate::Composable::compose($value))),+
        ])
    };
}
