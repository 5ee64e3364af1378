//! Indexed collections of catalog objects.
//!
//! A [`Collection`] owns its objects and indexes them by key. Lookups go
//! through the kind's key normalization, so `"public.orders"` and
//! `"orders"` find the same table when `public` is the default schema.
//!
//! Refresh replaces the whole membership. References obtained before a
//! refresh do not survive it; look objects up again afterwards.
//!
//! Keys are computed when an object enters the collection. An object whose
//! key later changes, by a rename or by `create` assigning an oid, stays
//! under its old key until [`Collection::update`], [`Collection::rekey`] or
//! a refresh re-indexes it.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::object::{Alterable, CatalogObject};
use pgmob_core::error::{Error, Result, UsageError, UsageErrorKind};
use std::collections::{HashMap, HashSet};

/// Iteration order of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionOrder {
    /// By key
    #[default]
    Sorted,
    /// As loaded or added
    Insertion,
}

/// Key composition settings shared by every collection of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyContext {
    default_schema: String,
}

impl KeyContext {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
        }
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// `schema.name`, or just `name` in the default schema.
    pub fn qualify(&self, schema: &str, name: &str) -> String {
        if schema == self.default_schema {
            name.to_string()
        } else {
            format!("{schema}.{name}")
        }
    }

    /// Strip a leading default-schema qualifier from a caller-supplied key.
    pub fn normalize(&self, raw: &str) -> String {
        raw.strip_prefix(self.default_schema.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(raw)
            .to_string()
    }
}

impl Default for KeyContext {
    fn default() -> Self {
        Self::new("public")
    }
}

/// Objects of one kind indexed by key.
#[derive(Debug, Clone)]
pub struct Collection<T: CatalogObject> {
    order: CollectionOrder,
    context: KeyContext,
    scope: T::Scope,
    entries: Vec<(T::Key, T)>,
    index: HashMap<T::Key, usize>,
}

impl<T: CatalogObject> Collection<T> {
    /// An empty collection with no remote I/O.
    pub fn empty(order: CollectionOrder, context: KeyContext, scope: T::Scope) -> Self {
        Self {
            order,
            context,
            scope,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load every object of the kind within `scope`.
    pub fn load(cluster: &Cluster, scope: T::Scope, order: CollectionOrder) -> Result<Self> {
        let mut collection = Self::empty(order, cluster.key_context(), scope);
        collection.refresh(cluster)?;
        Ok(collection)
    }

    pub fn order(&self) -> CollectionOrder {
        self.order
    }

    pub fn context(&self) -> &KeyContext {
        &self.context
    }

    pub fn scope(&self) -> &T::Scope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, raw: &str) -> Option<usize> {
        let key = T::parse_key(raw, &self.context)?;
        self.index.get(&key).copied()
    }

    fn missing(raw: &str) -> Error {
        UsageError::new(
            UsageErrorKind::MissingKey,
            format!("no {} with key '{raw}'", T::MAPPER.kind()),
        )
        .into()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn find(&self, key: &str) -> Option<&T> {
        self.position(key).map(|pos| &self.entries[pos].1)
    }

    /// The object under `key`, or a `MissingKey` usage error.
    pub fn get(&self, key: &str) -> Result<&T> {
        self.find(key).ok_or_else(|| Self::missing(key))
    }

    /// Mutable access to the object under `key`.
    ///
    /// The entry keeps its key even if the object is renamed or created
    /// through the returned reference. Use [`Collection::update`] for such
    /// operations, or call [`Collection::rekey`] afterwards.
    pub fn get_mut(&mut self, key: &str) -> Result<&mut T> {
        match self.position(key) {
            Some(pos) => Ok(&mut self.entries[pos].1),
            None => Err(Self::missing(key)),
        }
    }

    pub fn get_by_key(&self, key: &T::Key) -> Option<&T> {
        self.index.get(key).map(|pos| &self.entries[*pos].1)
    }

    fn duplicate(key: &T::Key, label: String) -> Error {
        UsageError::new(
            UsageErrorKind::DuplicateKey,
            format!("key '{key}' is already in the collection"),
        )
        .on(label)
        .into()
    }

    fn insert(&mut self, key: T::Key, object: T) -> usize {
        let pos = match self.order {
            CollectionOrder::Insertion => self.entries.len(),
            CollectionOrder::Sorted => self
                .entries
                .binary_search_by(|(k, _)| k.cmp(&key))
                .unwrap_or_else(|pos| pos),
        };
        self.entries.insert(pos, (key, object));
        self.reindex();
        pos
    }

    /// Insert an object; its key must not be taken.
    pub fn add(&mut self, object: T) -> Result<&mut T> {
        let key = object.key(&self.context);
        if self.index.contains_key(&key) {
            return Err(Self::duplicate(&key, object.label()));
        }
        let pos = self.insert(key, object);
        Ok(&mut self.entries[pos].1)
    }

    /// Run `op` on the object under `key`, then index the object under the
    /// key it has afterwards.
    ///
    /// The entry is re-indexed whether or not `op` succeeds; an error from
    /// `op` takes precedence over a key clash.
    ///
    /// ```ignore
    /// let key = object.key(objects.context()).to_string();
    /// objects.new(object)?;
    /// objects.update(&key, |object| object.create(&cluster))?;
    /// ```
    pub fn update<R>(&mut self, key: &str, op: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let pos = self.position(key).ok_or_else(|| Self::missing(key))?;
        let outcome = op(&mut self.entries[pos].1);
        let rekeyed = self.rekey_at(pos);
        let value = outcome?;
        rekeyed?;
        Ok(value)
    }

    fn rekey_at(&mut self, pos: usize) -> Result<()> {
        let key = self.entries[pos].1.key(&self.context);
        if key == self.entries[pos].0 {
            return Ok(());
        }
        if self.index.contains_key(&key) {
            return Err(Self::duplicate(&key, self.entries[pos].1.label()));
        }
        tracing::trace!(from = %self.entries[pos].0, to = %key, "Re-keying entry");
        match self.order {
            CollectionOrder::Insertion => {
                self.entries[pos].0 = key;
                self.reindex();
            }
            CollectionOrder::Sorted => {
                let (_, object) = self.entries.remove(pos);
                self.insert(key, object);
            }
        }
        Ok(())
    }

    /// Recompute the key of every member.
    ///
    /// If two members would end up sharing a key, nothing changes and a
    /// `DuplicateKey` usage error is returned.
    pub fn rekey(&mut self) -> Result<()> {
        let keys: Vec<T::Key> = self
            .entries
            .iter()
            .map(|(_, object)| object.key(&self.context))
            .collect();
        let mut seen = HashSet::with_capacity(keys.len());
        for (key, (_, object)) in keys.iter().zip(&self.entries) {
            if !seen.insert(key) {
                return Err(Self::duplicate(key, object.label()));
            }
        }
        for ((slot, _), key) in self.entries.iter_mut().zip(keys) {
            *slot = key;
        }
        if self.order == CollectionOrder::Sorted {
            self.entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        }
        self.reindex();
        Ok(())
    }

    /// Bind a not-yet-created object to this collection.
    ///
    /// Nothing is sent to the server; call `create` on the returned object.
    pub fn new(&mut self, mut object: T) -> Result<&mut T> {
        if !object.state().is_ephemeral() {
            return Err(UsageError::new(
                UsageErrorKind::AlreadyCreated,
                "only objects that do not exist yet can be bound as new",
            )
            .on(object.label())
            .into());
        }
        object.attach(&self.scope);
        self.add(object)
    }

    /// Take an object out of the collection. The server is not touched.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let pos = self.position(key)?;
        let (_, object) = self.entries.remove(pos);
        self.reindex();
        Some(object)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, object)| object)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, object)| object)
    }

    pub fn keys(&self) -> impl Iterator<Item = &T::Key> {
        self.entries.iter().map(|(key, _)| key)
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, (key, _))| (key.clone(), pos))
            .collect();
    }

    /// Replace the membership with the server's current listing.
    ///
    /// On error the previous contents are kept.
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(kind = %T::MAPPER.kind()))]
    pub fn refresh(&mut self, cluster: &Cluster) -> Result<()> {
        let statement = T::listing(cluster, &self.scope)?;
        let rows = cluster.query(&statement)?;

        let mut entries: Vec<(T::Key, T)> = Vec::with_capacity(rows.len());
        let mut seen: HashMap<T::Key, usize> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let mapped = T::MAPPER.map(row)?;
            let object = T::from_row(&mapped, &self.scope)?;
            let key = object.key(&self.context);
            if seen.contains_key(&key) {
                tracing::warn!(key = %key, "Duplicate key in listing, keeping the first row");
                continue;
            }
            seen.insert(key.clone(), entries.len());
            entries.push((key, object));
        }
        if self.order == CollectionOrder::Sorted {
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        }

        self.entries = entries;
        self.reindex();
        tracing::debug!(count = self.entries.len(), "Collection refreshed");
        Ok(())
    }
}

impl<T: Alterable> Collection<T> {
    /// Pending changes of every member, in iteration order.
    pub fn pending_changes(&self) -> Vec<&ChangeRecord> {
        self.iter()
            .flat_map(|object| object.state().changes().iter())
            .collect()
    }

    /// Apply every member's pending changes as one batch, then refresh.
    ///
    /// Nothing is sent when no member has pending changes. On failure the
    /// changes stay pending.
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(kind = %T::MAPPER.kind()))]
    pub fn alter(&mut self, cluster: &Cluster) -> Result<()> {
        let pending = self.pending_changes();
        if pending.is_empty() {
            tracing::trace!("No pending changes in collection");
            return Ok(());
        }
        cluster.apply(pending)?;
        for object in self.iter_mut() {
            object.state_mut().reset();
        }
        self.refresh(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Role, Table};
    use pgmob_core::testing::{ScriptedExecutor, rows};
    use pgmob_core::{ServerVersion, Value};

    fn role_row(name: &str, oid: u32) -> Vec<Value> {
        vec![
            name.into(),
            false.into(),
            true.into(),
            false.into(),
            false.into(),
            true.into(),
            false.into(),
            Value::Int(-1),
            Value::Null,
            false.into(),
            oid.into(),
        ]
    }

    fn table_row(schema: &str, name: &str, oid: u32) -> Vec<Value> {
        vec![
            name.into(),
            "postgres".into(),
            schema.into(),
            Value::Null,
            false.into(),
            oid.into(),
        ]
    }

    fn cluster(exec: &ScriptedExecutor) -> Cluster {
        Cluster::with_version(exec.clone(), ServerVersion::new(13, 4))
    }

    #[test]
    fn test_key_context() {
        let ctx = KeyContext::default();
        assert_eq!(ctx.qualify("public", "tbl"), "tbl");
        assert_eq!(ctx.qualify("app", "tbl"), "app.tbl");
        assert_eq!(ctx.normalize("public.tbl"), "tbl");
        assert_eq!(ctx.normalize("publicity.tbl"), "publicity.tbl");
        assert_eq!(ctx.normalize("tbl"), "tbl");
    }

    #[test]
    fn test_load_roles() {
        let exec = ScriptedExecutor::new();
        exec.respond(
            "pg_roles",
            rows(
                &["name"; 11],
                vec![role_row("c", 3), role_row("a", 1), role_row("b", 2)],
            ),
        );
        let roles = cluster(&exec).roles().unwrap();
        assert_eq!(roles.len(), 3);
        assert!(roles.contains("b"));
        let names: Vec<_> = roles.keys().cloned().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(roles.get("b").unwrap().state().oid(), Some(2));
        assert_eq!(
            roles.get("zz").unwrap_err().usage_kind(),
            Some(UsageErrorKind::MissingKey)
        );
    }

    #[test]
    fn test_default_schema_elision() {
        let exec = ScriptedExecutor::new();
        exec.respond(
            "relkind",
            rows(
                &["name"; 6],
                vec![table_row("public", "tbl", 10), table_row("app", "tbl", 11)],
            ),
        );
        let tables = cluster(&exec).tables().unwrap();
        assert!(tables.contains("public.tbl"));
        assert!(tables.contains("tbl"));
        assert_eq!(tables.get("app.tbl").unwrap().state().oid(), Some(11));
        assert_eq!(tables.get("public.tbl").unwrap().state().oid(), Some(10));
        assert!(!tables.contains("other.tbl"));
    }

    #[test]
    fn test_add_new_remove() {
        let mut roles: Collection<Role> =
            Collection::empty(CollectionOrder::Insertion, KeyContext::default(), ());
        roles.new(Role::new("zed")).unwrap();
        roles.new(Role::new("amy")).unwrap();
        let names: Vec<_> = roles.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["zed", "amy"]);

        let err = roles.add(Role::new("amy")).unwrap_err();
        assert_eq!(err.usage_kind(), Some(UsageErrorKind::DuplicateKey));

        assert!(roles.remove("zed").is_some());
        assert!(roles.remove("zed").is_none());
        assert_eq!(roles.len(), 1);
        assert_eq!(roles.get("amy").unwrap().name(), "amy");
    }

    #[test]
    fn test_update_reindexes_renamed_object() {
        let exec = ScriptedExecutor::new();
        exec.respond(
            "pg_roles",
            rows(&["name"; 11], vec![role_row("a", 1), role_row("b", 2)]),
        );
        let cluster = cluster(&exec);
        let mut roles = cluster.roles().unwrap();
        exec.respond("q.oid = $1", rows(&["name"; 11], vec![role_row("c", 1)]));

        roles
            .update("a", |role| {
                role.set_name("c")?;
                role.alter(&cluster)
            })
            .unwrap();
        assert!(!roles.contains("a"));
        assert_eq!(roles.get("c").unwrap().state().oid(), Some(1));
        assert_eq!(roles.keys().cloned().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_update_reindexes_after_failure() {
        let exec = ScriptedExecutor::new();
        exec.respond("pg_roles", rows(&["name"; 11], vec![role_row("a", 1)]));
        let cluster = cluster(&exec);
        let mut roles = cluster.roles().unwrap();
        exec.fail_on("RENAME TO", "permission denied");

        let err = roles
            .update("a", |role| {
                role.set_name("z")?;
                role.alter(&cluster)
            })
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert!(roles.contains("z"));
        assert_eq!(roles.get("z").unwrap().pending_changes().len(), 1);
        assert_eq!(
            roles.update("missing", |_| Ok(())).unwrap_err().usage_kind(),
            Some(UsageErrorKind::MissingKey)
        );
    }

    #[test]
    fn test_rekey_after_rename_through_get_mut() {
        let exec = ScriptedExecutor::new();
        exec.respond(
            "pg_roles",
            rows(&["name"; 11], vec![role_row("a", 1), role_row("b", 2)]),
        );
        let cluster = cluster(&exec);
        let mut roles = cluster.roles().unwrap();

        roles.get_mut("a").unwrap().set_name("b").unwrap();
        assert!(roles.contains("a"));
        let err = roles.rekey().unwrap_err();
        assert_eq!(err.usage_kind(), Some(UsageErrorKind::DuplicateKey));
        assert!(roles.contains("a"));

        roles.get_mut("a").unwrap().set_name("d").unwrap();
        roles.rekey().unwrap();
        assert_eq!(roles.keys().cloned().collect::<Vec<_>>(), vec!["b", "d"]);
        assert_eq!(roles.get("d").unwrap().state().oid(), Some(1));
    }

    #[test]
    fn test_refresh_failure_keeps_contents() {
        let exec = ScriptedExecutor::new();
        exec.respond("pg_roles", rows(&["name"; 11], vec![role_row("a", 1)]));
        let cluster = cluster(&exec);
        let mut roles = cluster.roles().unwrap();

        exec.fail_on("pg_roles", "connection lost");
        assert!(roles.refresh(&cluster).is_err());
        assert!(roles.contains("a"));
    }

    #[test]
    fn test_alter_without_changes_sends_nothing() {
        let exec = ScriptedExecutor::new();
        exec.respond("pg_roles", rows(&["name"; 11], vec![role_row("a", 1)]));
        let cluster = cluster(&exec);
        let mut roles = cluster.roles().unwrap();
        roles.alter(&cluster).unwrap();
        assert_eq!(exec.batch_count(), 0);
        assert!(exec.executed_sql().is_empty());
    }

    #[test]
    fn test_alter_flattens_in_iteration_order() {
        let exec = ScriptedExecutor::new();
        exec.respond(
            "pg_roles",
            rows(&["name"; 11], vec![role_row("a", 1), role_row("b", 2)]),
        );
        let cluster = cluster(&exec);
        let mut roles = cluster.roles().unwrap();
        roles.get_mut("b").unwrap().set_login(false).unwrap();
        roles.get_mut("a").unwrap().set_superuser(true).unwrap();
        roles.get_mut("a").unwrap().set_name("aa").unwrap();
        assert_eq!(roles.pending_changes().len(), 3);

        roles.alter(&cluster).unwrap();
        assert_eq!(
            exec.executed_sql(),
            vec![
                r#"ALTER ROLE "a" SUPERUSER"#,
                r#"ALTER ROLE "a" RENAME TO "aa""#,
                r#"ALTER ROLE "b" NOLOGIN"#,
            ]
        );
        assert_eq!(exec.batch_count(), 1);
        assert!(roles.pending_changes().is_empty());
    }
}
