//! Databases.
//!
//! `CREATE DATABASE` and `ALTER DATABASE .. SET TABLESPACE` cannot run
//! inside a transaction block, so their change records are marked to run
//! on their own.

use crate::change::ChangeRecord;
use crate::cluster::{Cluster, TerminateFilter};
use crate::collection::KeyContext;
use crate::mapper::{MappedRow, RowMapper};
use crate::object::{
    Alterable, CatalogObject, create_with, drop_with, lookup_by_name, no_template, script_of,
    tracked_setters,
};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::error::Result;
use pgmob_core::{ObjectKind, Oid};
use pgmob_sql::{CatalogQuery, Identifier, Literal, Sql, Statement, sql};

const ATTRIBUTES: &[&str] = &[
    "name",
    "owner",
    "encoding",
    "collation",
    "character_type",
    "is_template",
    "allow_connections",
    "connection_limit",
    "last_sys_oid",
    "frozen_xid",
    "min_multixact_id",
    "tablespace",
    "acl",
    "oid",
];

const ORDER: &[&str] = &[
    "owner",
    "tablespace",
    "is_template",
    "allow_connections",
    "connection_limit",
    "name",
];

#[derive(Debug, Clone)]
pub struct Database {
    state: ObjectState,
    name: String,
    owner: Option<String>,
    template: Option<String>,
    encoding: Option<String>,
    collation: Option<String>,
    character_type: Option<String>,
    is_template: bool,
    allow_connections: bool,
    connection_limit: i32,
    last_sys_oid: Option<i64>,
    frozen_xid: Option<i64>,
    min_multixact_id: Option<i64>,
    tablespace: Option<String>,
    acl: Option<Vec<String>>,
}

impl Database {
    /// A database that does not exist yet. Unset options take the server
    /// defaults at creation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::Database, ORDER),
            name: name.into(),
            owner: None,
            template: None,
            encoding: None,
            collation: None,
            character_type: None,
            is_template: false,
            allow_connections: true,
            connection_limit: -1,
            last_sys_oid: None,
            frozen_xid: None,
            min_multixact_id: None,
            tablespace: None,
            acl: None,
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Template to copy at creation.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Sets both `LC_COLLATE` and `LC_CTYPE`.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        let locale = locale.into();
        self.collation = Some(locale.clone());
        self.character_type = Some(locale);
        self
    }

    #[must_use]
    pub fn with_tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    #[must_use]
    pub fn with_is_template(mut self, is_template: bool) -> Self {
        self.is_template = is_template;
        self
    }

    #[must_use]
    pub fn with_connection_limit(mut self, limit: i32) -> Self {
        self.connection_limit = limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    pub fn character_type(&self) -> Option<&str> {
        self.character_type.as_deref()
    }

    pub fn is_template(&self) -> bool {
        self.is_template
    }

    pub fn allow_connections(&self) -> bool {
        self.allow_connections
    }

    pub fn connection_limit(&self) -> i32 {
        self.connection_limit
    }

    /// Not reported by Postgres 15 and later.
    pub fn last_sys_oid(&self) -> Option<i64> {
        self.last_sys_oid
    }

    pub fn frozen_xid(&self) -> Option<i64> {
        self.frozen_xid
    }

    pub fn min_multixact_id(&self) -> Option<i64> {
        self.min_multixact_id
    }

    pub fn tablespace(&self) -> Option<&str> {
        self.tablespace.as_deref()
    }

    pub fn acl(&self) -> Option<&[String]> {
        self.acl.as_deref()
    }

    pub fn oid(&self) -> Option<Oid> {
        self.state.oid()
    }

    tracked_setters! {
        set_name(name: String),
        set_is_template(is_template: bool),
        set_allow_connections(allow_connections: bool),
        set_connection_limit(connection_limit: i32),
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) -> Result<()> {
        self.set_tracked("owner", Some(owner.into()), |db| &mut db.owner)
    }

    /// Moving a database needs exclusive access and runs outside the
    /// alter transaction.
    pub fn set_tablespace(&mut self, tablespace: impl Into<String>) -> Result<()> {
        self.set_tracked("tablespace", Some(tablespace.into()), |db| &mut db.tablespace)
    }

    fn remote_ident(&self) -> Identifier {
        Identifier::new(self.state.remote_text("name", &self.name))
    }

    fn create_statement(&self) -> Result<ChangeRecord> {
        let mut options = Vec::new();
        if let Some(owner) = &self.owner {
            options.push(Sql::new("OWNER ") + Identifier::new(owner));
        }
        if let Some(template) = &self.template {
            options.push(Sql::new("TEMPLATE ") + Identifier::new(template));
        }
        if let Some(encoding) = &self.encoding {
            options.push(Sql::new("ENCODING ") + Literal::new(encoding));
        }
        if let Some(collation) = &self.collation {
            options.push(Sql::new("LC_COLLATE ") + Literal::new(collation));
        }
        if let Some(ctype) = &self.character_type {
            options.push(Sql::new("LC_CTYPE ") + Literal::new(ctype));
        }
        if let Some(tablespace) = &self.tablespace {
            options.push(Sql::new("TABLESPACE ") + Identifier::new(tablespace));
        }
        options.push(Sql::new("ALLOW_CONNECTIONS ") + Literal::new(self.allow_connections));
        options.push(Sql::new("CONNECTION LIMIT ") + Literal::new(self.connection_limit));
        options.push(Sql::new("IS_TEMPLATE ") + Literal::new(self.is_template));

        let statement = sql!(
            "CREATE DATABASE {name} WITH {options}",
            name = Identifier::new(&self.name),
            options = Sql::new(" ").join(options),
        )?;
        Ok(ChangeRecord::new(self.label(), "create", statement.into()).outside_transaction())
    }

    pub fn create(&mut self, cluster: &Cluster) -> Result<()> {
        let records = vec![self.create_statement()?];
        let lookup = lookup_by_name::<Self>(cluster, None, &self.name)?;
        create_with(self, cluster, records, &lookup)
    }

    pub fn drop(&mut self, cluster: &Cluster) -> Result<()> {
        let statement = sql!("DROP DATABASE {db}", db = self.remote_ident())?;
        drop_with(self, cluster, statement, false)
    }

    pub fn script(&self) -> Result<String> {
        script_of(&[self.create_statement()?])
    }

    /// Refuse new connections and terminate the existing ones. Returns the
    /// terminated backend pids. Pending changes are discarded.
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(database = %self.name))]
    pub fn disable(&mut self, cluster: &Cluster) -> Result<Vec<i32>> {
        self.set_connections(cluster, false)?;
        let name = self.state.remote_text("name", &self.name).to_string();
        let terminated = cluster.terminate(&TerminateFilter::new().database(name))?;
        self.refresh(cluster)?;
        Ok(terminated)
    }

    /// Accept connections again. Pending changes are discarded.
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(database = %self.name))]
    pub fn enable(&mut self, cluster: &Cluster) -> Result<()> {
        self.set_connections(cluster, true)?;
        self.refresh(cluster)
    }

    fn set_connections(&self, cluster: &Cluster, allow: bool) -> Result<()> {
        self.state.ensure_alterable(&self.label())?;
        cluster.execute(&Statement::new(sql!(
            "ALTER DATABASE {db} WITH ALLOW_CONNECTIONS {allow}",
            db = self.remote_ident(),
            allow = Literal::new(allow),
        )?))?;
        Ok(())
    }
}

impl CatalogObject for Database {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Database, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Databases;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        format!("Database('{}')", self.name)
    }

    fn key(&self, _context: &KeyContext) -> String {
        self.name.clone()
    }

    fn parse_key(raw: &str, _context: &KeyContext) -> Option<String> {
        Some(raw.to_string())
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        Ok(Self {
            state: ObjectState::persisted(
                ObjectKind::Database,
                ORDER,
                ObjectId::Oid(row.get("oid")?),
            ),
            name: row.get("name")?,
            owner: row.get("owner")?,
            template: None,
            encoding: row.get("encoding")?,
            collation: row.get("collation")?,
            character_type: row.get("character_type")?,
            is_template: row.get("is_template")?,
            allow_connections: row.get("allow_connections")?,
            connection_limit: row.get("connection_limit")?,
            last_sys_oid: row.get("last_sys_oid")?,
            frozen_xid: row.get("frozen_xid")?,
            min_multixact_id: row.get("min_multixact_id")?,
            tablespace: row.get("tablespace")?,
            acl: row.get("acl")?,
        })
    }

    fn scope(&self) {}
}

impl Alterable for Database {
    const ALTER_ORDER: &'static [&'static str] = ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let db = Identifier::new(self.state.text_at(attribute, "name", &self.name));
        let statement = match (attribute, &self.owner, &self.tablespace) {
            ("owner", Some(owner), _) => sql!(
                "ALTER DATABASE {db} OWNER TO {owner}",
                db = db,
                owner = Identifier::new(owner),
            )?,
            ("tablespace", _, Some(tablespace)) => {
                let statement = sql!(
                    "ALTER DATABASE {db} SET TABLESPACE {tablespace}",
                    db = db,
                    tablespace = Identifier::new(tablespace),
                )?;
                return Ok(ChangeRecord::new(self.label(), attribute, statement.into())
                    .outside_transaction());
            }
            ("is_template", ..) => sql!(
                "ALTER DATABASE {db} WITH IS_TEMPLATE {value}",
                db = db,
                value = Literal::new(self.is_template),
            )?,
            ("allow_connections", ..) => sql!(
                "ALTER DATABASE {db} WITH ALLOW_CONNECTIONS {value}",
                db = db,
                value = Literal::new(self.allow_connections),
            )?,
            ("connection_limit", ..) => sql!(
                "ALTER DATABASE {db} WITH CONNECTION LIMIT {value}",
                db = db,
                value = Literal::new(self.connection_limit),
            )?,
            ("name", ..) => sql!(
                "ALTER DATABASE {db} RENAME TO {name}",
                db = db,
                name = Identifier::new(&self.name),
            )?,
            (other, ..) => return Err(no_template(self.label(), other)),
        };
        Ok(ChangeRecord::new(self.label(), attribute, statement.into()))
    }
}
