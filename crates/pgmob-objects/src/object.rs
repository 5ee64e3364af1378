//! The traits every mirrored catalog object implements.
//!
//! [`CatalogObject`] covers identity, keys, row mapping and refresh.
//! [`Alterable`] adds dirty tracking and reconciliation for kinds with
//! mutable attributes.

use crate::change::{ChangeRecord, ChangeSet};
use crate::cluster::Cluster;
use crate::collection::KeyContext;
use crate::mapper::{MappedRow, RowMapper};
use crate::state::ObjectState;
use pgmob_core::error::{Error, MappingError, Result, UsageError, UsageErrorKind};
use pgmob_core::{Row, Value};
use pgmob_sql::{CatalogQuery, Composed, Placeholder, Sql, Statement, filtered};
use std::fmt;
use std::hash::Hash;

/// A local mirror of one remote catalog object.
pub trait CatalogObject: Sized {
    /// Collection key: a (possibly schema-qualified) name or an oid.
    type Key: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display;
    /// What a collection of this kind is scoped to, e.g. a table for columns.
    type Scope: Clone + fmt::Debug;

    const MAPPER: RowMapper;
    const QUERY: CatalogQuery;

    fn state(&self) -> &ObjectState;
    fn state_mut(&mut self) -> &mut ObjectState;

    /// Display label used in logs and errors, e.g. `Table('app.orders')`.
    fn label(&self) -> String;

    fn key(&self, context: &KeyContext) -> Self::Key;

    /// Normalize a caller-supplied key; `None` if it can never match.
    fn parse_key(raw: &str, context: &KeyContext) -> Option<Self::Key>;

    fn from_row(row: &MappedRow<'_>, scope: &Self::Scope) -> Result<Self>;

    fn scope(&self) -> Self::Scope;

    /// Bind a new child to the scope of the collection receiving it.
    fn attach(&mut self, _scope: &Self::Scope) {}

    /// The full listing for `scope`.
    fn listing(cluster: &Cluster, _scope: &Self::Scope) -> Result<Statement> {
        Ok(Statement::new(cluster.catalog_query(Self::QUERY)?))
    }

    /// The listing narrowed to this object. Defaults to a lookup by oid.
    fn lookup(&self, cluster: &Cluster) -> Result<Statement> {
        let oid = self
            .state()
            .oid()
            .ok_or_else(|| not_created(self.label(), "object has no oid"))?;
        let listing = cluster.catalog_query(Self::QUERY)?;
        Ok(Statement::new(filtered(listing, Sql::new("q.oid = ") + Placeholder)).bind(oid))
    }

    /// Re-read this object from the server, discarding pending changes.
    ///
    /// Ephemeral objects are left alone. Once the lookup has run, pending
    /// changes are gone whether or not the row was found.
    fn refresh(&mut self, cluster: &Cluster) -> Result<()> {
        if self.state().is_ephemeral() {
            tracing::trace!(object = %self.label(), "Ephemeral object, nothing to refresh");
            return Ok(());
        }
        let statement = self.lookup(cluster)?;
        let rows = cluster.query(&statement)?;
        self.state_mut().reset();

        let identity = self
            .state()
            .id()
            .map_or_else(|| self.label(), ToString::to_string);
        let scope = self.scope();
        *self = map_single(&rows, &identity, &scope)?;
        tracing::debug!(object = %self.label(), "Refreshed");
        Ok(())
    }
}

/// A catalog object with tracked, alterable attributes.
pub trait Alterable: CatalogObject {
    /// Tracked attributes in the order their statements are applied.
    /// Renames come last.
    const ALTER_ORDER: &'static [&'static str];

    /// Build the change that moves `attribute` on the server to its
    /// in-memory value.
    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord>;

    fn pending_changes(&self) -> &ChangeSet {
        self.state().changes()
    }

    /// Set a tracked attribute.
    ///
    /// The in-memory value changes immediately. For objects that exist on
    /// the server a change record is kept for the attribute; writing the
    /// original value back cancels it. Pending records are rebuilt so that
    /// each one addresses the object as it will be named when it runs.
    fn set_tracked<T>(
        &mut self,
        attribute: &'static str,
        value: T,
        slot: fn(&mut Self) -> &mut T,
    ) -> Result<()>
    where
        T: Clone + PartialEq + Into<Value>,
    {
        if *slot(self) == value {
            return Ok(());
        }
        self.state().ensure_live(&self.label())?;
        if self.state().is_ephemeral() {
            *slot(self) = value;
            return Ok(());
        }

        let new_value: Value = value.clone().into();
        let previous = std::mem::replace(slot(self), value);
        let state = self.state_mut();
        let fresh_baseline = !state.baseline_mut().contains_key(attribute);
        let original = state
            .baseline_mut()
            .entry(attribute)
            .or_insert_with(|| previous.clone().into())
            .clone();
        let reverted = original == new_value;

        let mut pending: Vec<&'static str> = state
            .changes()
            .attributes()
            .filter(|a| *a != attribute)
            .collect();
        if !reverted {
            pending.push(attribute);
        }

        let rebuilt: Result<Vec<ChangeRecord>> =
            pending.iter().map(|a| self.alter_statement(a)).collect();
        match rebuilt {
            Ok(records) => {
                let state = self.state_mut();
                if reverted {
                    state.baseline_mut().remove(attribute);
                }
                state.changes_mut().replace(records);
                tracing::trace!(
                    object = %self.label(),
                    attribute,
                    reverted,
                    pending = self.state().changes().len(),
                    "Tracked attribute set"
                );
                Ok(())
            }
            Err(err) => {
                *slot(self) = previous;
                if fresh_baseline {
                    self.state_mut().baseline_mut().remove(attribute);
                }
                Err(err)
            }
        }
    }

    /// Apply pending changes as one batch, then refresh.
    ///
    /// On failure the changes stay pending and the error is returned.
    fn alter(&mut self, cluster: &Cluster) -> Result<()> {
        let label = self.label();
        self.state().ensure_alterable(&label)?;
        if self.state().changes().is_empty() {
            tracing::trace!(object = %label, "No pending changes");
            return Ok(());
        }
        tracing::debug!(
            object = %label,
            changes = self.state().changes().len(),
            "Altering object"
        );
        cluster.apply(self.state().changes())?;
        self.state_mut().reset();
        self.refresh(cluster)
    }
}

/// Map the only row of a single-object lookup.
pub(crate) fn map_single<O: CatalogObject>(
    rows: &[Row],
    identity: &str,
    scope: &O::Scope,
) -> Result<O> {
    match rows {
        [row] => O::from_row(&O::MAPPER.map(row)?, scope),
        [] => Err(Error::not_found(O::MAPPER.kind(), identity)),
        more => Err(MappingError::attribute(
            O::MAPPER.kind(),
            "oid",
            format!("lookup returned {} rows", more.len()),
        )
        .into()),
    }
}

/// Narrow the kind's listing by name, and by schema when given.
pub(crate) fn lookup_by_name<O: CatalogObject>(
    cluster: &Cluster,
    schema: Option<&str>,
    name: &str,
) -> Result<Statement> {
    let listing = cluster.catalog_query(O::QUERY)?;
    Ok(match schema {
        Some(schema) => Statement::new(filtered(
            listing,
            Sql::new("q.schema = ") + Placeholder + Sql::new(" AND q.name = ") + Placeholder,
        ))
        .bind(schema)
        .bind(name),
        None => Statement::new(filtered(listing, Sql::new("q.name = ") + Placeholder)).bind(name),
    })
}

/// Run creation statements, then replace `object` with the server's view
/// of what was created.
pub(crate) fn create_with<O: CatalogObject>(
    object: &mut O,
    cluster: &Cluster,
    statements: Vec<ChangeRecord>,
    lookup: &Statement,
) -> Result<()> {
    let label = object.label();
    object.state().ensure_creatable(&label)?;
    tracing::debug!(object = %label, statements = statements.len(), "Creating object");
    cluster.apply(&statements)?;
    let rows = cluster.query(lookup)?;
    let scope = object.scope();
    *object = map_single(&rows, &label, &scope)?;
    tracing::debug!(object = %object.label(), id = ?object.state().id(), "Created");
    Ok(())
}

/// Run a drop statement and mark `object` dropped.
pub(crate) fn drop_with<O: CatalogObject>(
    object: &mut O,
    cluster: &Cluster,
    statement: Composed,
    cascade: bool,
) -> Result<()> {
    let label = object.label();
    object.state().ensure_alterable(&label)?;
    let statement = if cascade {
        statement + Sql::new(" CASCADE")
    } else {
        statement
    };
    cluster.execute(&Statement::new(statement))?;
    object.state_mut().mark_dropped();
    tracing::debug!(object = %label, cascade, "Dropped");
    Ok(())
}

/// Render creation statements for display.
pub(crate) fn script_of(statements: &[ChangeRecord]) -> Result<String> {
    let mut parts = Vec::with_capacity(statements.len());
    for record in statements {
        parts.push(record.statement().sql().as_script()?);
    }
    Ok(parts.join(";\n"))
}

/// Usage error for an operation that needs the object to exist remotely.
pub(crate) fn not_created(label: String, message: &str) -> Error {
    UsageError::new(UsageErrorKind::Ephemeral, message).on(label).into()
}

/// Usage error for an attribute this kind cannot alter.
pub(crate) fn no_template(label: String, attribute: &str) -> Error {
    UsageError::new(
        UsageErrorKind::NoTemplate,
        format!("no alter statement for attribute '{attribute}'"),
    )
    .on(label)
    .into()
}

/// `Kind('schema.name')`, eliding the `public` schema.
pub(crate) fn qualified_label(kind: &str, schema: &str, name: &str) -> String {
    if schema == "public" {
        format!("{kind}('{name}')")
    } else {
        format!("{kind}('{schema}.{name}')")
    }
}

/// `set_*` methods routed through [`Alterable::set_tracked`].
macro_rules! tracked_setters {
    ($($(#[$meta:meta])* $setter:ident($field:ident: $ty:ty)),+ $(,)?) => {
        $(
            $(#[$meta])*
            pub fn $setter(&mut self, value: impl Into<$ty>) -> pgmob_core::Result<()> {
                self.set_tracked(stringify!($field), value.into(), |object| &mut object.$field)
            }
        )+
    };
}

pub(crate) use tracked_setters;
