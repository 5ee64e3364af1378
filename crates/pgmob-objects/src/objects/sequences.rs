//! Sequences.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::collection::KeyContext;
use crate::mapper::{MappedRow, RowMapper};
use crate::object::{
    Alterable, CatalogObject, create_with, drop_with, lookup_by_name, no_template, not_created,
    qualified_label, script_of, tracked_setters,
};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::error::Result;
use pgmob_core::{ObjectKind, Oid};
use pgmob_sql::{CatalogQuery, Identifier, Literal, Placeholder, Sql, Statement, sql};

const ATTRIBUTES: &[&str] = &[
    "name",
    "owner",
    "schema",
    "data_type",
    "start_value",
    "min_value",
    "max_value",
    "increment_by",
    "cycle",
    "cache_size",
    "last_value",
    "oid",
];
const ORDER: &[&str] = &[
    "owner",
    "schema",
    "increment_by",
    "min_value",
    "max_value",
    "cache_size",
    "cycle",
    "name",
];

#[derive(Debug, Clone)]
pub struct Sequence {
    state: ObjectState,
    name: String,
    owner: Option<String>,
    schema: String,
    data_type: String,
    start_value: i64,
    min_value: i64,
    max_value: i64,
    increment_by: i64,
    cycle: bool,
    cache_size: i64,
    last_value: Option<i64>,
}

impl Sequence {
    /// An ascending `bigint` sequence with server defaults.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::Sequence, ORDER),
            name: name.into(),
            owner: None,
            schema: schema.into(),
            data_type: "bigint".to_string(),
            start_value: 1,
            min_value: 1,
            max_value: i64::MAX,
            increment_by: 1,
            cycle: false,
            cache_size: 1,
            last_value: None,
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// `smallint`, `integer` or `bigint`.
    #[must_use]
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    #[must_use]
    pub fn with_start_value(mut self, start_value: i64) -> Self {
        self.start_value = start_value;
        self
    }

    #[must_use]
    pub fn with_range(mut self, min_value: i64, max_value: i64) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }

    #[must_use]
    pub fn with_increment_by(mut self, increment_by: i64) -> Self {
        self.increment_by = increment_by;
        self
    }

    #[must_use]
    pub fn with_cycle(mut self, cycle: bool) -> Self {
        self.cycle = cycle;
        self
    }

    #[must_use]
    pub fn with_cache_size(mut self, cache_size: i64) -> Self {
        self.cache_size = cache_size;
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

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn start_value(&self) -> i64 {
        self.start_value
    }

    pub fn min_value(&self) -> i64 {
        self.min_value
    }

    pub fn max_value(&self) -> i64 {
        self.max_value
    }

    pub fn increment_by(&self) -> i64 {
        self.increment_by
    }

    pub fn cycle(&self) -> bool {
        self.cycle
    }

    pub fn cache_size(&self) -> i64 {
        self.cache_size
    }

    /// Last value handed out, as of the last refresh. `None` before first use.
    pub fn last_value(&self) -> Option<i64> {
        self.last_value
    }

    pub fn oid(&self) -> Option<Oid> {
        self.state.oid()
    }

    tracked_setters! {
        set_name(name: String),
        set_schema(schema: String),
        set_increment_by(increment_by: i64),
        set_min_value(min_value: i64),
        set_max_value(max_value: i64),
        set_cache_size(cache_size: i64),
        set_cycle(cycle: bool),
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) -> Result<()> {
        self.set_tracked("owner", Some(owner.into()), |sequence| &mut sequence.owner)
    }

    fn create_statements(&self) -> Result<Vec<ChangeRecord>> {
        let sequence = Identifier::qualified(&self.schema, &self.name);
        let create = Sql::new("CREATE SEQUENCE ")
            + &sequence
            + Sql::new(format!(" AS {}", self.data_type))
            + Sql::new(" INCREMENT BY ")
            + Literal::new(self.increment_by)
            + Sql::new(" MINVALUE ")
            + Literal::new(self.min_value)
            + Sql::new(" MAXVALUE ")
            + Literal::new(self.max_value)
            + Sql::new(" START WITH ")
            + Literal::new(self.start_value)
            + Sql::new(" CACHE ")
            + Literal::new(self.cache_size)
            + Sql::new(if self.cycle { " CYCLE" } else { " NO CYCLE" });
        let mut records = vec![ChangeRecord::new(self.label(), "create", create.into())];
        if let Some(owner) = &self.owner {
            let statement = sql!(
                "ALTER SEQUENCE {sequence} OWNER TO {owner}",
                sequence = &sequence,
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
        let sequence = Identifier::qualified(
            self.state.remote_text("schema", &self.schema),
            self.state.remote_text("name", &self.name),
        );
        let statement = sql!("DROP SEQUENCE {sequence}", sequence = sequence)?;
        drop_with(self, cluster, statement, cascade)
    }

    pub fn script(&self) -> Result<String> {
        script_of(&self.create_statements()?)
    }

    fn call(&self, cluster: &Cluster, call: &str, extra: Option<i64>) -> Result<i64> {
        let oid = self
            .oid()
            .ok_or_else(|| not_created(self.label(), "sequence does not exist yet"))?;
        let mut statement = Sql::new(format!("SELECT pg_catalog.{call}("))
            + Placeholder
            + Sql::new("::oid::regclass");
        if extra.is_some() {
            statement = statement + Sql::new(", ") + Placeholder;
        }
        let mut statement = Statement::new(statement + Sql::new(")")).bind(oid);
        if let Some(value) = extra {
            statement = statement.bind(value);
        }
        cluster.query_value(&statement)
    }

    /// Advance the sequence and return the new value.
    pub fn nextval(&self, cluster: &Cluster) -> Result<i64> {
        self.call(cluster, "nextval", None)
    }

    /// Value most recently returned by `nextval` in this session.
    pub fn currval(&self, cluster: &Cluster) -> Result<i64> {
        self.call(cluster, "currval", None)
    }

    /// Set the current value; the next `nextval` returns `value` plus the
    /// increment.
    pub fn setval(&self, cluster: &Cluster, value: i64) -> Result<i64> {
        self.call(cluster, "setval", Some(value))
    }
}

impl CatalogObject for Sequence {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Sequence, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Sequences;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        qualified_label("Sequence", &self.schema, &self.name)
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
                ObjectKind::Sequence,
                ORDER,
                ObjectId::Oid(row.get("oid")?),
            ),
            name: row.get("name")?,
            owner: row.get("owner")?,
            schema: row.get("schema")?,
            data_type: row.get("data_type")?,
            start_value: row.get("start_value")?,
            min_value: row.get("min_value")?,
            max_value: row.get("max_value")?,
            increment_by: row.get("increment_by")?,
            cycle: row.get("cycle")?,
            cache_size: row.get("cache_size")?,
            last_value: row.get("last_value")?,
        })
    }

    fn scope(&self) {}
}

impl Alterable for Sequence {
    const ALTER_ORDER: &'static [&'static str] = ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let sequence = Identifier::qualified(
            self.state.text_at(attribute, "schema", &self.schema),
            self.state.text_at(attribute, "name", &self.name),
        );
        let option = |keyword: &str, value: i64| {
            sql!(
                "ALTER SEQUENCE {sequence} {keyword} {value}",
                sequence = &sequence,
                keyword = Sql::new(keyword),
                value = Literal::new(value),
            )
        };
        let statement = match (attribute, &self.owner) {
            ("owner", Some(owner)) => sql!(
                "ALTER SEQUENCE {sequence} OWNER TO {owner}",
                sequence = &sequence,
                owner = Identifier::new(owner),
            )?,
            ("schema", _) => sql!(
                "ALTER SEQUENCE {sequence} SET SCHEMA {schema}",
                sequence = &sequence,
                schema = Identifier::new(&self.schema),
            )?,
            ("increment_by", _) => option("INCREMENT BY", self.increment_by)?,
            ("min_value", _) => option("MINVALUE", self.min_value)?,
            ("max_value", _) => option("MAXVALUE", self.max_value)?,
            ("cache_size", _) => option("CACHE", self.cache_size)?,
            ("cycle", _) => sql!(
                "ALTER SEQUENCE {sequence} {cycle}",
                sequence = &sequence,
                cycle = Sql::new(if self.cycle { "CYCLE" } else { "NO CYCLE" }),
            )?,
            ("name", _) => sql!(
                "ALTER SEQUENCE {sequence} RENAME TO {name}",
                sequence = &sequence,
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
    use pgmob_core::Value;
    use pgmob_core::testing::{ScriptedExecutor, rows};

    fn loaded(exec: &ScriptedExecutor) -> (Cluster, Sequence) {
        exec.respond(
            "pg_sequences",
            fixtures::sequences(vec![
                fixtures::sequence("public", "order_id_seq", "postgres", 16800),
                fixtures::sequence("app", "event_id_seq", "postgres", 16810),
            ]),
        );
        let cluster = fixtures::cluster(exec);
        let sequence = cluster.sequences().unwrap().remove("order_id_seq").unwrap();
        (cluster, sequence)
    }

    #[test]
    fn test_from_row() {
        let exec = ScriptedExecutor::new();
        let (cluster, sequence) = loaded(&exec);
        assert_eq!(sequence.data_type(), "bigint");
        assert_eq!(sequence.max_value(), i64::MAX);
        assert_eq!(sequence.last_value(), None);
        assert_eq!(sequence.label(), "Sequence('order_id_seq')");
        assert!(cluster.sequences().unwrap().contains("app.event_id_seq"));
    }

    #[test]
    fn test_alter_options_then_rename() {
        let exec = ScriptedExecutor::new();
        let (cluster, mut sequence) = loaded(&exec);
        sequence.set_name("order_seq").unwrap();
        sequence.set_cycle(true).unwrap();
        sequence.set_increment_by(5).unwrap();
        sequence.set_owner("foo").unwrap();
        exec.respond(
            "q.oid = $1",
            fixtures::sequences(vec![fixtures::sequence("public", "order_seq", "foo", 16800)]),
        );
        sequence.alter(&cluster).unwrap();
        assert_eq!(
            exec.executed_sql(),
            vec![
                r#"ALTER SEQUENCE "public"."order_id_seq" OWNER TO "foo""#,
                r#"ALTER SEQUENCE "public"."order_id_seq" INCREMENT BY 5"#,
                r#"ALTER SEQUENCE "public"."order_id_seq" CYCLE"#,
                r#"ALTER SEQUENCE "public"."order_id_seq" RENAME TO "order_seq""#,
            ]
        );
        assert_eq!(sequence.name(), "order_seq");
    }

    #[test]
    fn test_value_functions_bind_oid() {
        let exec = ScriptedExecutor::new();
        let (cluster, sequence) = loaded(&exec);
        exec.respond("nextval", rows(&["nextval"], vec![vec![Value::BigInt(7)]]));
        exec.respond("setval", rows(&["setval"], vec![vec![Value::BigInt(10)]]));
        assert_eq!(sequence.nextval(&cluster).unwrap(), 7);
        assert_eq!(sequence.setval(&cluster, 10).unwrap(), 10);

        let state = exec.state();
        let (sql, params) = state.queries.last().unwrap();
        assert_eq!(sql, "SELECT pg_catalog.setval($1::oid::regclass, $2)");
        assert_eq!(params, &vec![Value::BigInt(16800), Value::BigInt(10)]);
    }

    #[test]
    fn test_currval_on_ephemeral_sequence() {
        let exec = ScriptedExecutor::new();
        let cluster = fixtures::cluster(&exec);
        let err = Sequence::new("public", "s").currval(&cluster).unwrap_err();
        assert_eq!(
            err.usage_kind(),
            Some(pgmob_core::UsageErrorKind::Ephemeral)
        );
    }

    #[test]
    fn test_script_and_drop() {
        let exec = ScriptedExecutor::new();
        let (cluster, mut sequence) = loaded(&exec);
        assert_eq!(
            sequence.script().unwrap(),
            "CREATE SEQUENCE \"public\".\"order_id_seq\" AS bigint INCREMENT BY 1 \
             MINVALUE 1 MAXVALUE 9223372036854775807 START WITH 1 CACHE 1 NO CYCLE;\n\
             ALTER SEQUENCE \"public\".\"order_id_seq\" OWNER TO \"postgres\""
        );
        sequence.drop(&cluster, false).unwrap();
        assert_eq!(
            exec.executed_sql(),
            vec![r#"DROP SEQUENCE "public"."order_id_seq""#]
        );
    }
}
