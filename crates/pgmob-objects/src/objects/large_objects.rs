//! Large objects.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::collection::KeyContext;
use crate::mapper::{MappedRow, RowMapper};
use crate::object::{Alterable, CatalogObject, drop_with, no_template, not_created, script_of};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::error::Result;
use pgmob_core::{ObjectKind, Oid};
use pgmob_sql::{CatalogQuery, Identifier, Literal, Placeholder, Sql, Statement, sql};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const ATTRIBUTES: &[&str] = &["oid", "owner"];
const ORDER: &[&str] = &["owner"];

/// `INV_WRITE` for `lo_open`.
const INV_WRITE: i32 = 0x0002_0000;

static NEXT_LOCAL: AtomicU64 = AtomicU64::new(1);

/// Collection key of a large object.
///
/// Objects not created yet are told apart by a number unique within the
/// process, displayed as `new#<n>`, until the server assigns an oid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LargeObjectKey {
    Oid(Oid),
    Local(u64),
}

impl fmt::Display for LargeObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LargeObjectKey::Oid(oid) => write!(f, "{oid}"),
            LargeObjectKey::Local(local) => write!(f, "new#{local}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LargeObject {
    state: ObjectState,
    owner: Option<String>,
    local: u64,
}

impl Default for LargeObject {
    fn default() -> Self {
        Self::new()
    }
}

impl LargeObject {
    /// An empty large object; the server assigns the oid on creation.
    pub fn new() -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::LargeObject, ORDER),
            owner: None,
            local: NEXT_LOCAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn oid(&self) -> Option<Oid> {
        self.state.oid()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) -> Result<()> {
        self.set_tracked("owner", Some(owner.into()), |object| &mut object.owner)
    }

    fn require_oid(&self) -> Result<Oid> {
        self.oid()
            .ok_or_else(|| not_created(self.label(), "large object does not exist yet"))
    }

    fn owner_statement(&self, oid: Oid, owner: &str) -> Result<ChangeRecord> {
        let statement = sql!(
            "ALTER LARGE OBJECT {oid} OWNER TO {owner}",
            oid = Literal::new(oid),
            owner = Identifier::new(owner),
        )?;
        Ok(ChangeRecord::new(self.label(), "owner", statement.into()))
    }

    /// Create the object, then hand it to the configured owner.
    ///
    /// If the ownership change fails the object still exists. It is
    /// refreshed from the server, the owner change is left pending and the
    /// error is returned.
    pub fn create(&mut self, cluster: &Cluster) -> Result<()> {
        let label = self.label();
        self.state.ensure_creatable(&label)?;
        let oid: Oid = cluster.query_value(&Statement::new(Sql::new(
            "SELECT pg_catalog.lo_create(0)::bigint",
        )))?;
        self.state.assign_id(ObjectId::Oid(oid));
        tracing::debug!(object = %self.label(), "Created");
        if let Some(owner) = self.owner.clone() {
            let record = self.owner_statement(oid, &owner)?;
            if let Err(err) = cluster.apply([&record]) {
                tracing::warn!(object = %self.label(), error = %err, "Owner not applied");
                if let Err(pending) = self
                    .refresh(cluster)
                    .and_then(|()| self.set_owner(owner))
                {
                    tracing::warn!(
                        object = %self.label(),
                        error = %pending,
                        "Owner change not recorded"
                    );
                }
                return Err(err);
            }
        }
        self.refresh(cluster)
    }

    /// The whole content.
    pub fn read(&self, cluster: &Cluster) -> Result<Vec<u8>> {
        let statement = Statement::new(
            Sql::new("SELECT pg_catalog.lo_get(") + Placeholder + Sql::new("::oid)"),
        )
        .bind(self.require_oid()?);
        cluster.query_value(&statement)
    }

    /// Overwrite the content from the first byte on.
    pub fn write(&self, cluster: &Cluster, data: &[u8]) -> Result<()> {
        let statement = Statement::new(
            Sql::new("SELECT pg_catalog.lo_put(")
                + Placeholder
                + Sql::new("::oid, 0, ")
                + Placeholder
                + Sql::new(")"),
        )
        .bind(self.require_oid()?)
        .bind(data);
        cluster.query(&statement)?;
        Ok(())
    }

    /// Cut or zero-extend the content to `length` bytes.
    pub fn truncate(&self, cluster: &Cluster, length: i64) -> Result<()> {
        let statement = Statement::new(
            Sql::new("SELECT pg_catalog.lo_truncate64(pg_catalog.lo_open(")
                + Placeholder
                + Sql::new(format!("::oid, {INV_WRITE}), "))
                + Placeholder
                + Sql::new(")"),
        )
        .bind(self.require_oid()?)
        .bind(length);
        cluster.query(&statement)?;
        Ok(())
    }

    pub fn drop(&mut self, cluster: &Cluster) -> Result<()> {
        let oid = self.require_oid()?;
        let statement = Sql::new("SELECT pg_catalog.lo_unlink(") + Literal::new(oid) + Sql::new(")");
        drop_with(self, cluster, statement, false)
    }

    /// Statements recreating the object under its current oid.
    pub fn script(&self) -> Result<String> {
        let oid = self.require_oid()?;
        let create = Sql::new("SELECT pg_catalog.lo_create(") + Literal::new(oid) + Sql::new(")");
        let mut records = vec![ChangeRecord::new(self.label(), "create", create.into())];
        if let Some(owner) = &self.owner {
            records.push(self.owner_statement(oid, owner)?);
        }
        script_of(&records)
    }
}

impl CatalogObject for LargeObject {
    type Key = LargeObjectKey;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::LargeObject, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::LargeObjects;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        match self.oid() {
            Some(oid) => format!("LargeObject('{oid}')"),
            None => "LargeObject(new)".to_string(),
        }
    }

    fn key(&self, _context: &KeyContext) -> LargeObjectKey {
        match self.oid() {
            Some(oid) => LargeObjectKey::Oid(oid),
            None => LargeObjectKey::Local(self.local),
        }
    }

    fn parse_key(raw: &str, _context: &KeyContext) -> Option<LargeObjectKey> {
        let raw = raw.trim();
        match raw.strip_prefix("new#") {
            Some(local) => local.parse().ok().map(LargeObjectKey::Local),
            None => raw.parse().ok().map(LargeObjectKey::Oid),
        }
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        Ok(Self {
            state: ObjectState::persisted(
                ObjectKind::LargeObject,
                ORDER,
                ObjectId::Oid(row.get("oid")?),
            ),
            owner: row.get("owner")?,
            local: 0,
        })
    }

    fn scope(&self) {}
}

impl Alterable for LargeObject {
    const ALTER_ORDER: &'static [&'static str] = ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        match (attribute, self.oid(), &self.owner) {
            ("owner", Some(oid), Some(owner)) => self.owner_statement(oid, owner),
            (other, _, _) => Err(no_template(self.label(), other)),
        }
    }
}
