//! Views.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::collection::KeyContext;
use crate::mapper::{MappedRow, RowMapper};
use crate::object::{
    Alterable, CatalogObject, create_with, drop_with, lookup_by_name, no_template,
    qualified_label, script_of, tracked_setters,
};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::error::Result;
use pgmob_core::{ObjectKind, Oid};
use pgmob_sql::{CatalogQuery, Identifier, Sql, sql};

const ATTRIBUTES: &[&str] = &["name", "owner", "schema", "definition", "oid"];
const ORDER: &[&str] = &["owner", "schema", "name"];

#[derive(Debug, Clone)]
pub struct View {
    state: ObjectState,
    name: String,
    owner: Option<String>,
    schema: String,
    definition: String,
}

impl View {
    /// A view over `definition`, a `SELECT` in SQL text.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::View, ORDER),
            name: name.into(),
            owner: None,
            schema: schema.into(),
            definition: definition.into(),
        }
    }

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

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn oid(&self) -> Option<Oid> {
        self.state.oid()
    }

    tracked_setters! {
        set_name(name: String),
        set_schema(schema: String),
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) -> Result<()> {
        self.set_tracked("owner", Some(owner.into()), |view| &mut view.owner)
    }

    fn create_statements(&self) -> Result<Vec<ChangeRecord>> {
        let view = Identifier::qualified(&self.schema, &self.name);
        let create = Sql::new("CREATE VIEW ")
            + &view
            + Sql::new(" AS ")
            + Sql::new(self.definition.as_str());
        let mut records = vec![ChangeRecord::new(self.label(), "create", create.into())];
        if let Some(owner) = &self.owner {
            let statement = sql!(
                "ALTER VIEW {view} OWNER TO {owner}",
                view = &view,
                owner = Identifier::new(owner),
            )?;
            records.push(ChangeRecord::new(self.label(), "owner", statement.into()));
        }
        Ok(records)
    }

    pub fn create(&mut self, cluster: &Cluster) -> Result<()> {
        let records = self.create_statements()?;
        let lookup = lookup_by_name::<Self>(cluster, Some(&self.schema), &self.name)?;
        create_with(self, cluster, records, &lookup)
    }

    pub fn drop(&mut self, cluster: &Cluster, cascade: bool) -> Result<()> {
        let view = Identifier::qualified(
            self.state.remote_text("schema", &self.schema),
            self.state.remote_text("name", &self.name),
        );
        let statement = sql!("DROP VIEW {view}", view = view)?;
        drop_with(self, cluster, statement, cascade)
    }

    pub fn script(&self) -> Result<String> {
        script_of(&self.create_statements()?)
    }
}

impl CatalogObject for View {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::View, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Views;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        qualified_label("View", &self.schema, &self.name)
    }

    fn key(&self, context: &KeyContext) -> String {
        context.qualify(&self.schema, &self.name)
    }

    fn parse_key(raw: &str, context: &KeyContext) -> Option<String> {
        Some(context.normalize(raw))
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        let definition: String = row.get("definition")?;
        Ok(Self {
            state: ObjectState::persisted(ObjectKind::View, ORDER, ObjectId::Oid(row.get("oid")?)),
            name: row.get("name")?,
            owner: row.get("owner")?,
            schema: row.get("schema")?,
            // pg_get_viewdef pads the query and ends it with a semicolon
            definition: definition.trim().trim_end_matches(';').to_string(),
        })
    }

    fn scope(&self) {}
}

impl Alterable for View {
    const ALTER_ORDER: &'static [&'static str] = ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let view = Identifier::qualified(
            self.state.text_at(attribute, "schema", &self.schema),
            self.state.text_at(attribute, "name", &self.name),
        );
        let statement = match (attribute, &self.owner) {
            ("owner", Some(owner)) => sql!(
                "ALTER VIEW {view} OWNER TO {owner}",
                view = view,
                owner = Identifier::new(owner),
            )?,
            ("schema", _) => sql!(
                "ALTER VIEW {view} SET SCHEMA {schema}",
                view = view,
                schema = Identifier::new(&self.schema),
            )?,
            ("name", _) => sql!(
                "ALTER VIEW {view} RENAME TO {name}",
                view = view,
                name = Identifier::new(&self.name),
            )?,
            (other, _) => return Err(no_template(self.label(), other)),
        };
        Ok(ChangeRecord::new(self.label(), attribute, statement.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pgmob_core::testing::ScriptedExecutor;

    fn loaded(exec: &ScriptedExecutor) -> (Cluster, View) {
        exec.respond(
            "relkind = 'v'",
            fixtures::views(vec![fixtures::view("public", "open_orders", "postgres", 16700)]),
        );
        let cluster = fixtures::cluster(exec);
        let view = cluster.views().unwrap().remove("open_orders").unwrap();
        (cluster, view)
    }

    #[test]
    fn test_from_row_trims_definition() {
        let exec = ScriptedExecutor::new();
        let (_, view) = loaded(&exec);
        assert_eq!(view.definition(), "SELECT orders.id\n   FROM orders");
        assert_eq!(view.label(), "View('open_orders')");
        assert_eq!(
            view.script().unwrap(),
            "CREATE VIEW \"public\".\"open_orders\" AS SELECT orders.id\n   FROM orders;\n\
             ALTER VIEW \"public\".\"open_orders\" OWNER TO \"postgres\""
        );
    }

    #[test]
    fn test_alter_order() {
        let exec = ScriptedExecutor::new();
        let (cluster, mut view) = loaded(&exec);
        view.set_name("bar").unwrap();
        view.set_owner("foo").unwrap();
        view.set_schema("zzz").unwrap();
        exec.respond(
            "q.oid = $1",
            fixtures::views(vec![fixtures::view("zzz", "bar", "foo", 16700)]),
        );
        view.alter(&cluster).unwrap();
        assert_eq!(
            exec.executed_sql(),
            vec![
                r#"ALTER VIEW "public"."open_orders" OWNER TO "foo""#,
                r#"ALTER VIEW "public"."open_orders" SET SCHEMA "zzz""#,
                r#"ALTER VIEW "zzz"."open_orders" RENAME TO "bar""#,
            ]
        );
        assert_eq!(view.label(), "View('zzz.bar')");
    }

    #[test]
    fn test_create_and_drop_cascade() {
        let exec = ScriptedExecutor::new();
        exec.respond(
            "q.schema = $1 AND q.name = $2",
            fixtures::views(vec![fixtures::view("app", "recent", "postgres", 16710)]),
        );
        let cluster = fixtures::cluster(&exec);
        let mut view = View::new("app", "recent", "SELECT 1 AS one");
        view.create(&cluster).unwrap();
        assert_eq!(view.oid(), Some(16710));
        assert_eq!(
            exec.executed_sql(),
            vec![r#"CREATE VIEW "app"."recent" AS SELECT 1 AS one"#]
        );

        view.drop(&cluster, true).unwrap();
        assert_eq!(
            exec.executed_sql().last().map(String::as_str),
            Some(r#"DROP VIEW "app"."recent" CASCADE"#)
        );
        assert!(view.set_owner("x").is_err());
    }
}
