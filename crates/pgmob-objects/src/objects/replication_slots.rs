//! Replication slots.
//!
//! Slots have no oid; the server identifies them by name. They have no
//! alterable attributes.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::collection::KeyContext;
use crate::mapper::{CatalogCode, MappedRow, RowMapper};
use crate::object::{CatalogObject, create_with, drop_with, lookup_by_name, script_of};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::ObjectKind;
use pgmob_core::error::Result;
use pgmob_sql::{CatalogQuery, Composable, Composed, Literal, Placeholder, Sql, Statement};

const ATTRIBUTES: &[&str] = &[
    "name",
    "plugin",
    "slot_type",
    "database",
    "temporary",
    "active",
    "active_pid",
    "xmin",
    "catalog_xmin",
    "restart_lsn",
    "confirmed_flush_lsn",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    Logical,
    Physical,
}

impl CatalogCode for SlotType {
    const NAME: &'static str = "slot type";

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "logical" => Some(SlotType::Logical),
            "physical" => Some(SlotType::Physical),
            _ => None,
        }
    }

    fn code(self) -> &'static str {
        match self {
            SlotType::Logical => "logical",
            SlotType::Physical => "physical",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicationSlot {
    state: ObjectState,
    name: String,
    plugin: Option<String>,
    slot_type: SlotType,
    database: Option<String>,
    temporary: bool,
    active: bool,
    active_pid: Option<i32>,
    xmin: Option<String>,
    catalog_xmin: Option<String>,
    restart_lsn: Option<String>,
    confirmed_flush_lsn: Option<String>,
}

impl ReplicationSlot {
    fn ephemeral(name: String, plugin: Option<String>, slot_type: SlotType) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::ReplicationSlot, &[]),
            name,
            plugin,
            slot_type,
            database: None,
            temporary: false,
            active: false,
            active_pid: None,
            xmin: None,
            catalog_xmin: None,
            restart_lsn: None,
            confirmed_flush_lsn: None,
        }
    }

    /// A logical slot decoding through `plugin`, e.g. `pgoutput`.
    pub fn logical(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self::ephemeral(name.into(), Some(plugin.into()), SlotType::Logical)
    }

    pub fn physical(name: impl Into<String>) -> Self {
        Self::ephemeral(name.into(), None, SlotType::Physical)
    }

    /// Temporary slots are released when the creating session ends.
    #[must_use]
    pub fn with_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    pub fn slot_type(&self) -> SlotType {
        self.slot_type
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn temporary(&self) -> bool {
        self.temporary
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn active_pid(&self) -> Option<i32> {
        self.active_pid
    }

    pub fn xmin(&self) -> Option<&str> {
        self.xmin.as_deref()
    }

    pub fn catalog_xmin(&self) -> Option<&str> {
        self.catalog_xmin.as_deref()
    }

    pub fn restart_lsn(&self) -> Option<&str> {
        self.restart_lsn.as_deref()
    }

    pub fn confirmed_flush_lsn(&self) -> Option<&str> {
        self.confirmed_flush_lsn.as_deref()
    }

    fn create_statement(&self) -> ChangeRecord {
        let args = match (self.slot_type, &self.plugin) {
            (SlotType::Logical, plugin) => {
                let mut args = Literal::new(self.name.as_str())
                    + Sql::new(", ")
                    + Literal::new(plugin.clone().unwrap_or_default());
                if self.temporary {
                    args = args + Sql::new(", true");
                }
                Sql::new("SELECT pg_catalog.pg_create_logical_replication_slot(") + args
            }
            (SlotType::Physical, _) => {
                let mut args = Literal::new(self.name.as_str()).compose();
                if self.temporary {
                    args = args + Sql::new(", false, true");
                }
                Sql::new("SELECT pg_catalog.pg_create_physical_replication_slot(") + args
            }
        };
        let statement = args + Sql::new(")");
        ChangeRecord::new(self.label(), "create", statement.into()).outside_transaction()
    }

    pub fn create(&mut self, cluster: &Cluster) -> Result<()> {
        let records = vec![self.create_statement()];
        let lookup = lookup_by_name::<Self>(cluster, None, &self.name)?;
        create_with(self, cluster, records, &lookup)
    }

    /// Terminate the backend streaming from this slot, if any.
    pub fn disconnect(&self, cluster: &Cluster) -> Result<()> {
        let statement = Statement::new(
            Sql::new(
                "SELECT pg_catalog.pg_terminate_backend(s.active_pid) \
                 FROM pg_catalog.pg_replication_slots s \
                 WHERE s.active_pid IS NOT NULL AND s.slot_name = ",
            ) + Placeholder,
        )
        .bind(self.name.as_str());
        cluster.query(&statement)?;
        tracing::debug!(slot = %self.name, "Disconnected replication slot");
        Ok(())
    }

    /// Disconnect any consumer, then drop the slot.
    pub fn drop(&mut self, cluster: &Cluster) -> Result<()> {
        self.state.ensure_alterable(&self.label())?;
        self.disconnect(cluster)?;
        let statement: Composed = Sql::new("SELECT pg_catalog.pg_drop_replication_slot(")
            + Literal::new(self.name.as_str())
            + Sql::new(")");
        drop_with(self, cluster, statement, false)
    }

    pub fn script(&self) -> Result<String> {
        script_of(&[self.create_statement()])
    }
}

impl CatalogObject for ReplicationSlot {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::ReplicationSlot, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::ReplicationSlots;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        format!("ReplicationSlot('{}')", self.name)
    }

    fn key(&self, _context: &KeyContext) -> String {
        self.name.clone()
    }

    fn parse_key(raw: &str, _context: &KeyContext) -> Option<String> {
        Some(raw.to_string())
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        let name: String = row.get("name")?;
        Ok(Self {
            state: ObjectState::persisted(
                ObjectKind::ReplicationSlot,
                &[],
                ObjectId::Name(name.clone()),
            ),
            name,
            plugin: row.get("plugin")?,
            slot_type: row.decode("slot_type")?,
            database: row.get("database")?,
            temporary: row.get("temporary")?,
            active: row.get("active")?,
            active_pid: row.get("active_pid")?,
            xmin: row.get("xmin")?,
            catalog_xmin: row.get("catalog_xmin")?,
            restart_lsn: row.get("restart_lsn")?,
            confirmed_flush_lsn: row.get("confirmed_flush_lsn")?,
        })
    }

    fn scope(&self) {}

    fn lookup(&self, cluster: &Cluster) -> Result<Statement> {
        lookup_by_name::<Self>(cluster, None, &self.name)
    }
}
