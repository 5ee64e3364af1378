//! Catalog listing queries, selected by server version.
//!
//! Every listing aliases its output columns to the attribute names of the
//! object kind it lists, in mapper order. That lets [`filtered`] narrow any
//! listing to one object by `oid` or `name` without knowing its internals.

use crate::composed::{Composable, Composed, Sql};
use pgmob_core::error::{Error, Result, UsageErrorKind};
use pgmob_core::ServerVersion;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The catalog listings the object model knows how to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogQuery {
    Roles,
    Databases,
    Schemas,
    Tables,
    /// Columns of one table; the table oid goes in the `{table}` slot
    Columns,
    Views,
    Sequences,
    Procedures,
    ReplicationSlots,
    LargeObjects,
    HbaRules,
}

impl CatalogQuery {
    pub const fn name(self) -> &'static str {
        match self {
            CatalogQuery::Roles => "roles",
            CatalogQuery::Databases => "databases",
            CatalogQuery::Schemas => "schemas",
            CatalogQuery::Tables => "tables",
            CatalogQuery::Columns => "columns",
            CatalogQuery::Views => "views",
            CatalogQuery::Sequences => "sequences",
            CatalogQuery::Procedures => "procedures",
            CatalogQuery::ReplicationSlots => "replication_slots",
            CatalogQuery::LargeObjects => "large_objects",
            CatalogQuery::HbaRules => "hba_rules",
        }
    }
}

impl fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const BUILTIN: &[(CatalogQuery, u32, &str)] = &[
    (CatalogQuery::Roles, 0, include_str!("../sql/roles.sql")),
    (CatalogQuery::Databases, 0, include_str!("../sql/databases.sql")),
    (CatalogQuery::Databases, 15, include_str!("../sql/databases_15.sql")),
    (CatalogQuery::Schemas, 0, include_str!("../sql/schemas.sql")),
    (CatalogQuery::Tables, 0, include_str!("../sql/tables.sql")),
    (CatalogQuery::Columns, 0, include_str!("../sql/columns.sql")),
    (CatalogQuery::Columns, 10, include_str!("../sql/columns_10.sql")),
    (CatalogQuery::Columns, 12, include_str!("../sql/columns_12.sql")),
    (CatalogQuery::Views, 0, include_str!("../sql/views.sql")),
    (CatalogQuery::Sequences, 0, include_str!("../sql/sequences.sql")),
    (CatalogQuery::Procedures, 0, include_str!("../sql/procedures.sql")),
    (CatalogQuery::Procedures, 11, include_str!("../sql/procedures_11.sql")),
    (CatalogQuery::ReplicationSlots, 0, include_str!("../sql/replication_slots.sql")),
    (CatalogQuery::ReplicationSlots, 10, include_str!("../sql/replication_slots_10.sql")),
    (CatalogQuery::LargeObjects, 0, include_str!("../sql/large_objects.sql")),
    (CatalogQuery::HbaRules, 0, include_str!("../sql/hba_rules.sql")),
];

/// Mapping from (query, minimum server major version) to query text.
///
/// Built once and shared by reference; cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    entries: HashMap<CatalogQuery, Vec<(u32, Arc<str>)>>,
}

impl QueryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The queries bundled with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (query, min_major, text) in BUILTIN {
            registry.register(*query, *min_major, *text);
        }
        registry
    }

    /// Register `text` for servers at or above `min_major`.
    ///
    /// `0` registers the default. An existing entry for the same version is
    /// replaced.
    pub fn register(
        &mut self,
        query: CatalogQuery,
        min_major: u32,
        text: impl AsRef<str>,
    ) -> &mut Self {
        let text: Arc<str> = Arc::from(text.as_ref().trim_end());
        let variants = self.entries.entry(query).or_default();
        match variants.binary_search_by_key(&min_major, |(v, _)| *v) {
            Ok(pos) => variants[pos].1 = text,
            Err(pos) => variants.insert(pos, (min_major, text)),
        }
        self
    }

    /// Pick the most specific variant whose minimum major version does not
    /// exceed `version`. Without a version only the default applies.
    pub fn resolve(&self, query: CatalogQuery, version: Option<ServerVersion>) -> Result<Sql> {
        let variants = self.entries.get(&query).map(Vec::as_slice).unwrap_or_default();
        let major = version.map_or(0, |v| v.major);
        let chosen = variants
            .iter()
            .rev()
            .find(|(min_major, _)| *min_major <= major)
            .ok_or_else(|| {
                Error::usage(
                    UsageErrorKind::NoTemplate,
                    format!("no '{query}' query registered for server version {major}"),
                )
            })?;
        tracing::trace!(query = %query, min_major = chosen.0, major, "Resolved catalog query");
        Ok(Sql::new(&*chosen.1))
    }
}

/// Narrow a listing to the rows matching `condition`, which may refer to
/// the listing's columns through the alias `q`.
///
/// ```
/// use pgmob_sql::{Placeholder, Sql, filtered};
///
/// let by_oid = filtered(Sql::new("SELECT 1 AS oid"), Sql::new("q.oid = ") + Placeholder);
/// assert_eq!(by_oid.to_string(), "SELECT * FROM (SELECT 1 AS oid) AS q WHERE q.oid = $1");
/// ```
pub fn filtered(listing: impl Composable, condition: impl Composable) -> Composed {
    Sql::new("SELECT * FROM (") + listing + Sql::new(") AS q WHERE ") + condition
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(registry: &QueryRegistry, query: CatalogQuery, version: Option<&str>) -> String {
        let version = version.map(|v| v.parse::<ServerVersion>().unwrap());
        registry.resolve(query, version).unwrap().as_str().to_string()
    }

    #[test]
    fn test_highest_version_not_exceeding() {
        let mut registry = QueryRegistry::new();
        registry
            .register(CatalogQuery::Procedures, 0, "default")
            .register(CatalogQuery::Procedures, 11, "v11")
            .register(CatalogQuery::Procedures, 14, "v14");

        assert_eq!(text(&registry, CatalogQuery::Procedures, Some("9.6")), "default");
        assert_eq!(text(&registry, CatalogQuery::Procedures, Some("11.0")), "v11");
        assert_eq!(text(&registry, CatalogQuery::Procedures, Some("13.4")), "v11");
        assert_eq!(text(&registry, CatalogQuery::Procedures, Some("16.1")), "v14");
        assert_eq!(text(&registry, CatalogQuery::Procedures, None), "default");
    }

    #[test]
    fn test_missing_default_is_usage_error() {
        let mut registry = QueryRegistry::new();
        registry.register(CatalogQuery::Columns, 12, "v12");
        let err = registry
            .resolve(CatalogQuery::Columns, Some(ServerVersion::new(10, 0)))
            .unwrap_err();
        assert_eq!(err.usage_kind(), Some(UsageErrorKind::NoTemplate));
        assert!(registry.resolve(CatalogQuery::Roles, None).is_err());
    }

    #[test]
    fn test_register_replaces_same_version() {
        let mut registry = QueryRegistry::builtin();
        registry.register(CatalogQuery::Roles, 0, "SELECT 'override'\n");
        assert_eq!(text(&registry, CatalogQuery::Roles, None), "SELECT 'override'");
    }

    #[test]
    fn test_columns_listing_takes_table_slot() {
        let listing = QueryRegistry::builtin()
            .resolve(CatalogQuery::Columns, Some(ServerVersion::new(13, 0)))
            .unwrap()
            .format(&[("table", crate::Placeholder.compose())])
            .unwrap();
        let narrowed = filtered(listing, Sql::new("q.number = ") + crate::Placeholder);
        assert_eq!(narrowed.placeholder_count(), 2);
        let text = narrowed.render();
        assert!(text.contains("a.attrelid = $1"));
        assert!(text.ends_with("q.number = $2"));
    }

    #[test]
    fn test_builtin_versions() {
        let registry = QueryRegistry::builtin();
        assert!(text(&registry, CatalogQuery::Procedures, Some("10.12")).contains("proisagg"));
        assert!(text(&registry, CatalogQuery::Procedures, Some("11.2")).contains("prokind"));
        assert!(!text(&registry, CatalogQuery::Columns, Some("9.6")).contains("attidentity"));
        assert!(text(&registry, CatalogQuery::Columns, Some("12.1")).contains("attgenerated"));
        assert!(text(&registry, CatalogQuery::Databases, Some("14.0")).contains("datlastsysoid"));
        assert!(!text(&registry, CatalogQuery::Databases, Some("15.0")).contains("datlastsysoid"));
    }
}
