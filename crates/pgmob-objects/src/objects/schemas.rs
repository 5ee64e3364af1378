//! Schemas.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::collection::KeyContext;
use crate::mapper::{MappedRow, RowMapper};
use crate::object::{
    Alterable, CatalogObject, create_with, drop_with, lookup_by_name, no_template, script_of,
    tracked_setters,
};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::error::Result;
use pgmob_core::{ObjectKind, Oid};
use pgmob_sql::{CatalogQuery, Identifier, Sql, sql};

const ATTRIBUTES: &[&str] = &["name", "owner", "oid"];
const ORDER: &[&str] = &["owner", "name"];

#[derive(Debug, Clone)]
pub struct Schema {
    state: ObjectState,
    name: String,
    owner: Option<String>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::Schema, ORDER),
            name: name.into(),
            owner: None,
        }
    }

    /// Owner given as `AUTHORIZATION` at creation.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn oid(&self) -> Option<Oid> {
        self.state.oid()
    }

    tracked_setters! {
        set_name(name: String),
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) -> Result<()> {
        self.set_tracked("owner", Some(owner.into()), |schema| &mut schema.owner)
    }

    fn create_statement(&self) -> Result<ChangeRecord> {
        let mut statement = sql!("CREATE SCHEMA {name}", name = Identifier::new(&self.name))?;
        if let Some(owner) = &self.owner {
            statement = statement + Sql::new(" AUTHORIZATION ") + Identifier::new(owner);
        }
        Ok(ChangeRecord::new(self.label(), "create", statement.into()))
    }

    pub fn create(&mut self, cluster: &Cluster) -> Result<()> {
        let records = vec![self.create_statement()?];
        let lookup = lookup_by_name::<Self>(cluster, None, &self.name)?;
        create_with(self, cluster, records, &lookup)
    }

    pub fn drop(&mut self, cluster: &Cluster, cascade: bool) -> Result<()> {
        let name = self.state.remote_text("name", &self.name);
        let statement = sql!("DROP SCHEMA {name}", name = Identifier::new(name))?;
        drop_with(self, cluster, statement, cascade)
    }

    pub fn script(&self) -> Result<String> {
        script_of(&[self.create_statement()?])
    }
}

impl CatalogObject for Schema {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Schema, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Schemas;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        format!("Schema('{}')", self.name)
    }

    fn key(&self, _context: &KeyContext) -> String {
        self.name.clone()
    }

    fn parse_key(raw: &str, _context: &KeyContext) -> Option<String> {
        Some(raw.to_string())
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        Ok(Self {
            state: ObjectState::persisted(ObjectKind::Schema, ORDER, ObjectId::Oid(row.get("oid")?)),
            name: row.get("name")?,
            owner: row.get("owner")?,
        })
    }

    fn scope(&self) {}
}

impl Alterable for Schema {
    const ALTER_ORDER: &'static [&'static str] = ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let schema = Identifier::new(self.state.text_at(attribute, "name", &self.name));
        let statement = match (attribute, &self.owner) {
            ("owner", Some(owner)) => sql!(
                "ALTER SCHEMA {schema} OWNER TO {owner}",
                schema = schema,
                owner = Identifier::new(owner),
            )?,
            ("name", _) => sql!(
                "ALTER SCHEMA {schema} RENAME TO {name}",
                schema = schema,
                name = Identifier::new(&self.name),
            )?,
            (other, _) => return Err(no_template(self.label(), other)),
        };
        Ok(ChangeRecord::new(self.label(), attribute, statement.into()))
    }
}
