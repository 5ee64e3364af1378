//! Tables and their columns.
//!
//! Columns live in a collection scoped to one table and keep the table's
//! attribute-number order. A [`TableRef`] carries the owning table's oid and
//! the name the server knows it by.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::collection::{Collection, KeyContext};
use crate::mapper::{CatalogCode, MappedRow, RowMapper};
use crate::object::{
    Alterable, CatalogObject, create_with, drop_with, lookup_by_name, no_template, not_created,
    qualified_label, script_of, tracked_setters,
};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::error::{MappingError, Result};
use pgmob_core::{ObjectKind, Oid};
use pgmob_sql::{
    CatalogQuery, Composable, Composed, Identifier, Placeholder, Sql, Statement, filtered, sql,
};

const TABLE_ATTRIBUTES: &[&str] = &["name", "owner", "schema", "tablespace", "row_security", "oid"];
const TABLE_ORDER: &[&str] = &["owner", "schema", "tablespace", "row_security", "name"];

#[derive(Debug, Clone)]
pub struct Table {
    state: ObjectState,
    name: String,
    owner: Option<String>,
    schema: String,
    tablespace: Option<String>,
    row_security: bool,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::Table, TABLE_ORDER),
            name: name.into(),
            owner: None,
            schema: schema.into(),
            tablespace: None,
            row_security: false,
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    #[must_use]
    pub fn with_tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    #[must_use]
    pub fn with_row_security(mut self, enabled: bool) -> Self {
        self.row_security = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// `None` means the database default.
    pub fn tablespace(&self) -> Option<&str> {
        self.tablespace.as_deref()
    }

    pub fn row_security(&self) -> bool {
        self.row_security
    }

    pub fn oid(&self) -> Option<Oid> {
        self.state.oid()
    }

    tracked_setters! {
        set_name(name: String),
        /// Move the table to another schema.
        set_schema(schema: String),
        set_row_security(row_security: bool),
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) -> Result<()> {
        self.set_tracked("owner", Some(owner.into()), |table| &mut table.owner)
    }

    pub fn set_tablespace(&mut self, tablespace: impl Into<String>) -> Result<()> {
        self.set_tracked("tablespace", Some(tablespace.into()), |table| {
            &mut table.tablespace
        })
    }

    /// The table as the server currently names it.
    pub fn table_ref(&self) -> TableRef {
        TableRef {
            oid: self.state.oid(),
            schema: self.state.remote_text("schema", &self.schema).to_string(),
            name: self.state.remote_text("name", &self.name).to_string(),
        }
    }

    /// Columns of this table, in attribute-number order.
    pub fn columns(&self, cluster: &Cluster) -> Result<Collection<Column>> {
        cluster.columns(self)
    }

    fn identifier(&self) -> Identifier {
        Identifier::qualified(&self.schema, &self.name)
    }

    fn create_statements(&self, columns: Vec<Composed>) -> Result<Vec<ChangeRecord>> {
        let table = self.identifier();
        let mut create = Sql::new("CREATE TABLE ")
            + &table
            + Sql::new(" (")
            + Sql::new(", ").join(columns)
            + Sql::new(")");
        if let Some(tablespace) = &self.tablespace {
            create = create + Sql::new(" TABLESPACE ") + Identifier::new(tablespace);
        }
        let mut records = vec![ChangeRecord::new(self.label(), "create", create.into())];
        if let Some(owner) = &self.owner {
            let statement = sql!(
                "ALTER TABLE {table} OWNER TO {owner}",
                table = &table,
                owner = Identifier::new(owner),
            )?;
            records.push(ChangeRecord::new(self.label(), "owner", statement.into()));
        }
        if self.row_security {
            let statement = sql!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY", table = &table)?;
            records.push(ChangeRecord::new(
                self.label(),
                "row_security",
                statement.into(),
            ));
        }
        Ok(records)
    }

    /// Create an empty table; add columns through [`Table::columns`].
    pub fn create(&mut self, cluster: &Cluster) -> Result<()> {
        let records = self.create_statements(Vec::new())?;
        let lookup = lookup_by_name::<Self>(cluster, Some(&self.schema), &self.name)?;
        create_with(self, cluster, records, &lookup)
    }

    pub fn drop(&mut self, cluster: &Cluster, cascade: bool) -> Result<()> {
        let table = self.table_ref().identifier();
        let statement = sql!("DROP TABLE {table}", table = table)?;
        drop_with(self, cluster, statement, cascade)
    }

    /// DDL recreating the table with its current columns.
    pub fn script(&self, cluster: &Cluster) -> Result<String> {
        let columns = if self.state.is_ephemeral() {
            Vec::new()
        } else {
            self.columns(cluster)?.iter().map(Column::definition).collect()
        };
        script_of(&self.create_statements(columns)?)
    }
}

impl CatalogObject for Table {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Table, TABLE_ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Tables;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        qualified_label("Table", &self.schema, &self.name)
    }

    fn key(&self, context: &KeyContext) -> String {
        context.qualify(&self.schema, &self.name)
    }

    fn parse_key(raw: &str, context: &KeyContext) -> Option<String> {
        Some(context.normalize(raw))
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        Ok(Self {
            state: ObjectState::persisted(
                ObjectKind::Table,
                TABLE_ORDER,
                ObjectId::Oid(row.get("oid")?),
            ),
            name: row.get("name")?,
            owner: row.get("owner")?,
            schema: row.get("schema")?,
            tablespace: row.get("tablespace")?,
            row_security: row.get("row_security")?,
        })
    }

    fn scope(&self) {}
}

impl Alterable for Table {
    const ALTER_ORDER: &'static [&'static str] = TABLE_ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let table = Identifier::qualified(
            self.state.text_at(attribute, "schema", &self.schema),
            self.state.text_at(attribute, "name", &self.name),
        );
        let statement = match (attribute, &self.owner) {
            ("owner", Some(owner)) => sql!(
                "ALTER TABLE {table} OWNER TO {owner}",
                table = table,
                owner = Identifier::new(owner),
            )?,
            ("schema", _) => sql!(
                "ALTER TABLE {table} SET SCHEMA {schema}",
                table = table,
                schema = Identifier::new(&self.schema),
            )?,
            ("tablespace", _) => sql!(
                "ALTER TABLE {table} SET TABLESPACE {tablespace}",
                table = table,
                tablespace = Identifier::new(self.tablespace.as_deref().unwrap_or("pg_default")),
            )?,
            ("row_security", _) => sql!(
                "ALTER TABLE {table} {action} ROW LEVEL SECURITY",
                table = table,
                action = Sql::new(if self.row_security { "ENABLE" } else { "DISABLE" }),
            )?,
            ("name", _) => sql!(
                "ALTER TABLE {table} RENAME TO {name}",
                table = table,
                name = Identifier::new(&self.name),
            )?,
            (other, _) => return Err(no_template(self.label(), other)),
        };
        Ok(ChangeRecord::new(self.label(), attribute, statement.into()))
    }
}

/// The table a column belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRef {
    pub oid: Option<Oid>,
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn identifier(&self) -> Identifier {
        Identifier::qualified(&self.schema, &self.name)
    }

    pub fn label(&self) -> String {
        qualified_label("Table", &self.schema, &self.name)
    }
}

/// `attidentity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnIdentity {
    #[default]
    NotIdentity,
    Always,
    ByDefault,
}

impl CatalogCode for ColumnIdentity {
    const NAME: &'static str = "identity";

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "" => Some(ColumnIdentity::NotIdentity),
            "a" => Some(ColumnIdentity::Always),
            "d" => Some(ColumnIdentity::ByDefault),
            _ => None,
        }
    }

    fn code(self) -> &'static str {
        match self {
            ColumnIdentity::NotIdentity => "",
            ColumnIdentity::Always => "a",
            ColumnIdentity::ByDefault => "d",
        }
    }
}

/// `attgenerated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratedColumn {
    #[default]
    NotGenerated,
    Stored,
}

impl CatalogCode for GeneratedColumn {
    const NAME: &'static str = "generated";

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "" => Some(GeneratedColumn::NotGenerated),
            "s" => Some(GeneratedColumn::Stored),
            _ => None,
        }
    }

    fn code(self) -> &'static str {
        match self {
            GeneratedColumn::NotGenerated => "",
            GeneratedColumn::Stored => "s",
        }
    }
}

const COLUMN_ATTRIBUTES: &[&str] = &[
    "name",
    "type_name",
    "stat_target",
    "number",
    "is_array",
    "type_mod",
    "nullable",
    "has_default",
    "identity",
    "generated",
    "collation",
    "expression",
];
const COLUMN_ORDER: &[&str] = &["nullable", "name"];

#[derive(Debug, Clone)]
pub struct Column {
    state: ObjectState,
    table: TableRef,
    name: String,
    type_name: String,
    stat_target: i32,
    is_array: bool,
    type_mod: i32,
    nullable: bool,
    has_default: bool,
    identity: ColumnIdentity,
    generated: GeneratedColumn,
    collation: Option<String>,
    expression: Option<String>,
}

impl Column {
    /// A new nullable column. `type_name` is SQL text such as `numeric(12,2)`.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::Column, COLUMN_ORDER),
            table: TableRef::default(),
            name: name.into(),
            type_name: type_name.into(),
            stat_target: -1,
            is_array: false,
            type_mod: -1,
            nullable: true,
            has_default: false,
            identity: ColumnIdentity::NotIdentity,
            generated: GeneratedColumn::NotGenerated,
            collation: None,
            expression: None,
        }
    }

    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// Default expression, as SQL text.
    #[must_use]
    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.has_default = true;
        self.expression = Some(expression.into());
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn stat_target(&self) -> i32 {
        self.stat_target
    }

    /// Attribute number, once the column exists.
    pub fn number(&self) -> Option<i16> {
        match self.state.id() {
            Some(ObjectId::Column { number, .. }) => Some(*number),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn type_mod(&self) -> i32 {
        self.type_mod
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn has_default(&self) -> bool {
        self.has_default
    }

    pub fn identity(&self) -> ColumnIdentity {
        self.identity
    }

    pub fn generated(&self) -> GeneratedColumn {
        self.generated
    }

    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    /// Default or generation expression.
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    tracked_setters! {
        set_name(name: String),
        set_nullable(nullable: bool),
    }

    /// Column definition as it appears in `CREATE TABLE` and `ADD COLUMN`.
    fn definition(&self) -> Composed {
        let mut definition = Identifier::new(&self.name) + Sql::new(format!(" {}", self.type_name));
        if let Some(collation) = &self.collation {
            definition = definition + Sql::new(" COLLATE ") + Identifier::new(collation);
        }
        match (self.identity, self.generated, &self.expression) {
            (ColumnIdentity::Always, _, _) => {
                definition = definition + Sql::new(" GENERATED ALWAYS AS IDENTITY");
            }
            (ColumnIdentity::ByDefault, _, _) => {
                definition = definition + Sql::new(" GENERATED BY DEFAULT AS IDENTITY");
            }
            (_, GeneratedColumn::Stored, Some(expression)) => {
                definition =
                    definition + Sql::new(format!(" GENERATED ALWAYS AS ({expression}) STORED"));
            }
            (_, _, Some(expression)) if self.has_default => {
                definition = definition + Sql::new(format!(" DEFAULT {expression}"));
            }
            _ => {}
        }
        if !self.nullable {
            definition = definition + Sql::new(" NOT NULL");
        }
        definition
    }

    /// Add the column to its table.
    pub fn create(&mut self, cluster: &Cluster) -> Result<()> {
        let table_oid = self.table.oid.ok_or_else(|| {
            not_created(
                self.table.label(),
                "columns can only be added to an existing table",
            )
        })?;
        let statement = Sql::new("ALTER TABLE ")
            + self.table.identifier()
            + Sql::new(" ADD COLUMN ")
            + self.definition();
        let records = vec![ChangeRecord::new(self.label(), "create", statement.into())];
        let lookup = Statement::new(filtered(
            columns_listing(cluster)?,
            Sql::new("q.name = ") + Placeholder,
        ))
        .bind(table_oid)
        .bind(self.name.as_str());
        create_with(self, cluster, records, &lookup)
    }

    /// Change the column type right away, then refresh.
    ///
    /// `type_name` and `using` are SQL text.
    pub fn set_type(
        &mut self,
        cluster: &Cluster,
        type_name: &str,
        collation: Option<&str>,
        using: Option<&str>,
    ) -> Result<()> {
        let label = self.label();
        self.state.ensure_alterable(&label)?;
        let mut statement = sql!(
            "ALTER TABLE {table} ALTER COLUMN {column} TYPE ",
            table = self.table.identifier(),
            column = Identifier::new(self.state.remote_text("name", &self.name)),
        )? + Sql::new(type_name);
        if let Some(collation) = collation {
            statement = statement + Sql::new(" COLLATE ") + Identifier::new(collation);
        }
        if let Some(using) = using {
            statement = statement + Sql::new(format!(" USING ({using})"));
        }
        cluster.execute(&Statement::new(statement))?;
        tracing::debug!(object = %label, type_name, "Column type changed");
        self.refresh(cluster)
    }

    pub fn drop(&mut self, cluster: &Cluster, cascade: bool) -> Result<()> {
        let statement = sql!(
            "ALTER TABLE {table} DROP COLUMN {column}",
            table = self.table.identifier(),
            column = Identifier::new(self.state.remote_text("name", &self.name)),
        )?;
        drop_with(self, cluster, statement, cascade)
    }
}

fn columns_listing(cluster: &Cluster) -> Result<Composed> {
    cluster
        .catalog_query(CatalogQuery::Columns)?
        .format(&[("table", Placeholder.compose())])
}

impl CatalogObject for Column {
    type Key = String;
    type Scope = TableRef;

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Column, COLUMN_ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Columns;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        qualified_label(
            "Column",
            &self.table.schema,
            &format!("{}.{}", self.table.name, self.name),
        )
    }

    fn key(&self, _context: &KeyContext) -> String {
        self.name.clone()
    }

    fn parse_key(raw: &str, _context: &KeyContext) -> Option<String> {
        Some(raw.to_string())
    }

    fn from_row(row: &MappedRow<'_>, scope: &TableRef) -> Result<Self> {
        let table = scope.oid.ok_or_else(|| {
            MappingError::attribute(ObjectKind::Column, "table", "owning table has no oid")
        })?;
        let id = ObjectId::Column {
            table,
            number: row.get("number")?,
        };
        Ok(Self {
            state: ObjectState::persisted(ObjectKind::Column, COLUMN_ORDER, id),
            table: scope.clone(),
            name: row.get("name")?,
            type_name: row.get("type_name")?,
            stat_target: row.get::<Option<i32>>("stat_target")?.unwrap_or(-1),
            is_array: row.get("is_array")?,
            type_mod: row.get("type_mod")?,
            nullable: row.get("nullable")?,
            has_default: row.get("has_default")?,
            identity: row.decode("identity")?,
            generated: row.decode("generated")?,
            collation: row.get("collation")?,
            expression: row.get("expression")?,
        })
    }

    fn scope(&self) -> TableRef {
        self.table.clone()
    }

    fn attach(&mut self, scope: &TableRef) {
        self.table = scope.clone();
    }

    fn listing(cluster: &Cluster, scope: &TableRef) -> Result<Statement> {
        let oid = scope
            .oid
            .ok_or_else(|| not_created(scope.label(), "table has no oid"))?;
        Ok(Statement::new(columns_listing(cluster)?).bind(oid))
    }

    fn lookup(&self, cluster: &Cluster) -> Result<Statement> {
        let Some(ObjectId::Column { table, number }) = self.state.id() else {
            return Err(not_created(self.label(), "column has no attribute number"));
        };
        Ok(Statement::new(filtered(
            columns_listing(cluster)?,
            Sql::new("q.number = ") + Placeholder,
        ))
        .bind(*table)
        .bind(*number))
    }
}

impl Alterable for Column {
    const ALTER_ORDER: &'static [&'static str] = COLUMN_ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let table = self.table.identifier();
        let column = Identifier::new(self.state.text_at(attribute, "name", &self.name));
        let statement = match attribute {
            "nullable" => sql!(
                "ALTER TABLE {table} ALTER COLUMN {column} {action}",
                table = table,
                column = column,
                action = Sql::new(if self.nullable {
                    "DROP NOT NULL"
                } else {
                    "SET NOT NULL"
                }),
            )?,
            "name" => sql!(
                "ALTER TABLE {table} RENAME COLUMN {column} TO {name}",
                table = table,
                column = column,
                name = Identifier::new(&self.name),
            )?,
            other => return Err(no_template(self.label(), other)),
        };
        Ok(ChangeRecord::new(self.label(), attribute, statement.into()))
    }
}
