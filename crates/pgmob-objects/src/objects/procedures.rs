//! Functions and procedures.
//!
//! Overloads share a schema-qualified name, so the collection groups them:
//! a [`ProcedureCollection`] maps each name to its [`ProcedureVariations`],
//! ordered by oid. Statements address a routine by its full signature.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::collection::KeyContext;
use crate::mapper::{CatalogCode, MappedRow, RowMapper};
use crate::object::{
    Alterable, CatalogObject, drop_with, no_template, not_created, qualified_label,
    tracked_setters,
};
use crate::state::{ObjectId, ObjectState};
use pgmob_core::error::{Error, Result, UsageError, UsageErrorKind};
use pgmob_core::{ObjectKind, Oid, Value};
use pgmob_sql::{CatalogQuery, Composed, Identifier, Placeholder, Sql, Statement, sql};
use std::collections::BTreeMap;

/// `prokind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Function,
    Procedure,
    Aggregate,
    Window,
}

impl ProcedureKind {
    /// DDL keyword addressing routines of this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            ProcedureKind::Function | ProcedureKind::Window => "FUNCTION",
            ProcedureKind::Procedure => "PROCEDURE",
            ProcedureKind::Aggregate => "AGGREGATE",
        }
    }
}

impl CatalogCode for ProcedureKind {
    const NAME: &'static str = "procedure kind";

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "f" => Some(ProcedureKind::Function),
            "p" => Some(ProcedureKind::Procedure),
            "a" => Some(ProcedureKind::Aggregate),
            "w" => Some(ProcedureKind::Window),
            _ => None,
        }
    }

    fn code(self) -> &'static str {
        match self {
            ProcedureKind::Function => "f",
            ProcedureKind::Procedure => "p",
            ProcedureKind::Aggregate => "a",
            ProcedureKind::Window => "w",
        }
    }
}

/// `provolatile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

impl CatalogCode for Volatility {
    const NAME: &'static str = "volatility";

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "i" => Some(Volatility::Immutable),
            "s" => Some(Volatility::Stable),
            "v" => Some(Volatility::Volatile),
            _ => None,
        }
    }

    fn code(self) -> &'static str {
        match self {
            Volatility::Immutable => "i",
            Volatility::Stable => "s",
            Volatility::Volatile => "v",
        }
    }
}

impl From<Volatility> for Value {
    fn from(volatility: Volatility) -> Self {
        Value::from(volatility.code())
    }
}

/// `proparallel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelSafety {
    Safe,
    Restricted,
    Unsafe,
}

impl CatalogCode for ParallelSafety {
    const NAME: &'static str = "parallel mode";

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "s" => Some(ParallelSafety::Safe),
            "r" => Some(ParallelSafety::Restricted),
            "u" => Some(ParallelSafety::Unsafe),
            _ => None,
        }
    }

    fn code(self) -> &'static str {
        match self {
            ParallelSafety::Safe => "s",
            ParallelSafety::Restricted => "r",
            ParallelSafety::Unsafe => "u",
        }
    }
}

impl From<ParallelSafety> for Value {
    fn from(mode: ParallelSafety) -> Self {
        Value::from(mode.code())
    }
}

const ATTRIBUTES: &[&str] = &[
    "oid",
    "name",
    "schema",
    "owner",
    "language",
    "kind",
    "security_definer",
    "leak_proof",
    "strict",
    "volatility",
    "parallel_mode",
    "argument_types",
];
const ORDER: &[&str] = &[
    "owner",
    "schema",
    "security_definer",
    "leak_proof",
    "strict",
    "volatility",
    "parallel_mode",
    "name",
];

/// Attributes `ALTER PROCEDURE` and `ALTER AGGREGATE` cannot change.
const FUNCTION_ONLY: &[&str] = &["leak_proof", "strict", "volatility", "parallel_mode"];

/// A function, procedure, aggregate or window function.
#[derive(Debug, Clone)]
pub struct Procedure {
    state: ObjectState,
    name: String,
    schema: String,
    owner: Option<String>,
    language: String,
    kind: ProcedureKind,
    security_definer: bool,
    leak_proof: bool,
    strict: bool,
    volatility: Volatility,
    parallel_mode: ParallelSafety,
    argument_types: Vec<String>,
}

impl Procedure {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn security_definer(&self) -> bool {
        self.security_definer
    }

    pub fn leak_proof(&self) -> bool {
        self.leak_proof
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn volatility(&self) -> Volatility {
        self.volatility
    }

    pub fn parallel_mode(&self) -> ParallelSafety {
        self.parallel_mode
    }

    /// Input argument types as the server formats them, e.g. `integer`.
    pub fn argument_types(&self) -> &[String] {
        &self.argument_types
    }

    pub fn oid(&self) -> Option<Oid> {
        self.state.oid()
    }

    tracked_setters! {
        set_name(name: String),
        set_schema(schema: String),
        set_security_definer(security_definer: bool),
        /// Functions only.
        set_leak_proof(leak_proof: bool),
        /// Functions only; `true` is `STRICT`, `false` is `CALLED ON NULL INPUT`.
        set_strict(strict: bool),
        /// Functions only.
        set_volatility(volatility: Volatility),
        /// Functions only.
        set_parallel_mode(parallel_mode: ParallelSafety),
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) -> Result<()> {
        self.set_tracked("owner", Some(owner.into()), |procedure| {
            &mut procedure.owner
        })
    }

    /// `"schema"."name"(type, ...)`.
    fn signature(&self, schema: &str, name: &str) -> Composed {
        Identifier::qualified(schema, name)
            + Sql::new("(")
            + Sql::new(", ").join(self.argument_types.iter().map(|t| Sql::new(t.as_str())))
            + Sql::new(")")
    }

    pub fn drop(&mut self, cluster: &Cluster, cascade: bool) -> Result<()> {
        let signature = self.signature(
            self.state.remote_text("schema", &self.schema),
            self.state.remote_text("name", &self.name),
        );
        let statement = Sql::new(format!("DROP {} ", self.kind.keyword())) + signature;
        drop_with(self, cluster, statement, cascade)
    }

    /// The server's `CREATE OR REPLACE` text for this routine.
    pub fn script(&self, cluster: &Cluster) -> Result<String> {
        let oid = self
            .oid()
            .ok_or_else(|| not_created(self.label(), "routine has no oid"))?;
        let statement = Statement::new(
            Sql::new("SELECT pg_catalog.pg_get_functiondef(") + Placeholder + Sql::new(")"),
        )
        .bind(oid);
        cluster.query_value(&statement)
    }
}

impl CatalogObject for Procedure {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Procedure, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Procedures;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        let kind = match self.kind {
            ProcedureKind::Procedure => "Procedure",
            ProcedureKind::Aggregate => "Aggregate",
            ProcedureKind::Function | ProcedureKind::Window => "Function",
        };
        qualified_label(kind, &self.schema, &self.name)
    }

    fn key(&self, context: &KeyContext) -> String {
        context.qualify(&self.schema, &self.name)
    }

    fn parse_key(raw: &str, context: &KeyContext) -> Option<String> {
        Some(context.normalize(raw))
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        let kind: ProcedureKind = row.decode("kind")?;
        let object_kind = match kind {
            ProcedureKind::Procedure => ObjectKind::Procedure,
            _ => ObjectKind::Function,
        };
        Ok(Self {
            state: ObjectState::persisted(object_kind, ORDER, ObjectId::Oid(row.get("oid")?)),
            name: row.get("name")?,
            schema: row.get("schema")?,
            owner: row.get("owner")?,
            language: row.get("language")?,
            kind,
            security_definer: row.get("security_definer")?,
            leak_proof: row.get("leak_proof")?,
            strict: row.get("strict")?,
            volatility: row.decode("volatility")?,
            parallel_mode: row.decode("parallel_mode")?,
            argument_types: row
                .get::<Option<Vec<String>>>("argument_types")?
                .unwrap_or_default(),
        })
    }

    fn scope(&self) {}
}

impl Alterable for Procedure {
    const ALTER_ORDER: &'static [&'static str] = ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let function_only = FUNCTION_ONLY.contains(&attribute)
            || (attribute == "security_definer" && self.kind == ProcedureKind::Aggregate);
        if function_only && matches!(self.kind, ProcedureKind::Procedure | ProcedureKind::Aggregate) {
            return Err(UsageError::new(
                UsageErrorKind::NoTemplate,
                format!(
                    "'{attribute}' cannot be altered on a {}",
                    self.kind.keyword().to_lowercase()
                ),
            )
            .on(self.label())
            .into());
        }

        let routine = self.signature(
            self.state.text_at(attribute, "schema", &self.schema),
            self.state.text_at(attribute, "name", &self.name),
        );
        let keyword = Sql::new(self.kind.keyword());
        let action = |text: &str| {
            sql!(
                "ALTER {keyword} {routine} {action}",
                keyword = keyword.clone(),
                routine = &routine,
                action = Sql::new(text),
            )
        };
        let statement = match (attribute, &self.owner) {
            ("owner", Some(owner)) => sql!(
                "ALTER {keyword} {routine} OWNER TO {owner}",
                keyword = keyword.clone(),
                routine = &routine,
                owner = Identifier::new(owner),
            )?,
            ("schema", _) => sql!(
                "ALTER {keyword} {routine} SET SCHEMA {schema}",
                keyword = keyword.clone(),
                routine = &routine,
                schema = Identifier::new(&self.schema),
            )?,
            ("security_definer", _) => action(if self.security_definer {
                "SECURITY DEFINER"
            } else {
                "SECURITY INVOKER"
            })?,
            ("leak_proof", _) => action(if self.leak_proof {
                "LEAKPROOF"
            } else {
                "NOT LEAKPROOF"
            })?,
            ("strict", _) => action(if self.strict {
                "STRICT"
            } else {
                "CALLED ON NULL INPUT"
            })?,
            ("volatility", _) => action(match self.volatility {
                Volatility::Immutable => "IMMUTABLE",
                Volatility::Stable => "STABLE",
                Volatility::Volatile => "VOLATILE",
            })?,
            ("parallel_mode", _) => action(match self.parallel_mode {
                ParallelSafety::Safe => "PARALLEL SAFE",
                ParallelSafety::Restricted => "PARALLEL RESTRICTED",
                ParallelSafety::Unsafe => "PARALLEL UNSAFE",
            })?,
            ("name", _) => sql!(
                "ALTER {keyword} {routine} RENAME TO {name}",
                keyword = keyword.clone(),
                routine = &routine,
                name = Identifier::new(&self.name),
            )?,
            (other, _) => return Err(no_template(self.label(), other)),
        };
        Ok(ChangeRecord::new(self.label(), attribute, statement.into()))
    }
}

/// Overloads sharing one schema-qualified name, ordered by oid.
#[derive(Debug, Clone)]
pub struct ProcedureVariations {
    key: String,
    procedures: Vec<Procedure>,
}

impl ProcedureVariations {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Procedure> {
        self.procedures.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Procedure> {
        self.procedures.get_mut(index)
    }

    /// The overload taking exactly `argument_types`.
    pub fn find(&self, argument_types: &[&str]) -> Option<&Procedure> {
        self.procedures
            .iter()
            .find(|p| p.argument_types.iter().map(String::as_str).eq(argument_types.iter().copied()))
    }

    pub fn find_mut(&mut self, argument_types: &[&str]) -> Option<&mut Procedure> {
        self.procedures
            .iter_mut()
            .find(|p| p.argument_types.iter().map(String::as_str).eq(argument_types.iter().copied()))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Procedure> {
        self.procedures.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Procedure> {
        self.procedures.iter_mut()
    }
}

/// Every routine in the database outside the system schemas, grouped by name.
#[derive(Debug, Clone)]
pub struct ProcedureCollection {
    context: KeyContext,
    groups: BTreeMap<String, ProcedureVariations>,
}

impl ProcedureCollection {
    pub fn load(cluster: &Cluster) -> Result<Self> {
        let mut collection = Self {
            context: cluster.key_context(),
            groups: BTreeMap::new(),
        };
        collection.refresh(cluster)?;
        Ok(collection)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.groups.contains_key(&self.context.normalize(key))
    }

    pub fn find(&self, key: &str) -> Option<&ProcedureVariations> {
        self.groups.get(&self.context.normalize(key))
    }

    pub fn get(&self, key: &str) -> Result<&ProcedureVariations> {
        self.find(key).ok_or_else(|| missing(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Result<&mut ProcedureVariations> {
        self.groups
            .get_mut(&self.context.normalize(key))
            .ok_or_else(|| missing(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcedureVariations> {
        self.groups.values()
    }

    /// Every routine, group by group.
    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.groups.values().flat_map(ProcedureVariations::iter)
    }

    /// Reload every group. On error the previous contents are kept.
    #[tracing::instrument(level = "debug", skip(self, cluster))]
    pub fn refresh(&mut self, cluster: &Cluster) -> Result<()> {
        let rows = cluster.query(&Procedure::listing(cluster, &())?)?;
        let mut groups: BTreeMap<String, ProcedureVariations> = BTreeMap::new();
        for row in &rows {
            let procedure = Procedure::from_row(&Procedure::MAPPER.map(row)?, &())?;
            let key = procedure.key(&self.context);
            groups
                .entry(key.clone())
                .or_insert_with(|| ProcedureVariations {
                    key,
                    procedures: Vec::new(),
                })
                .procedures
                .push(procedure);
        }
        for group in groups.values_mut() {
            group.procedures.sort_by_key(Procedure::oid);
        }
        self.groups = groups;
        tracing::debug!(names = self.groups.len(), "Procedures refreshed");
        Ok(())
    }

    pub fn pending_changes(&self) -> Vec<&ChangeRecord> {
        self.procedures()
            .flat_map(|procedure| procedure.pending_changes().iter())
            .collect()
    }

    /// Apply every routine's pending changes as one batch, then refresh.
    pub fn alter(&mut self, cluster: &Cluster) -> Result<()> {
        let pending = self.pending_changes();
        if pending.is_empty() {
            return Ok(());
        }
        cluster.apply(pending)?;
        for group in self.groups.values_mut() {
            for procedure in group.iter_mut() {
                procedure.state_mut().reset();
            }
        }
        self.refresh(cluster)
    }
}

fn missing(key: &str) -> Error {
    UsageError::new(
        UsageErrorKind::MissingKey,
        format!("no routine named '{key}'"),
    )
    .into()
}
