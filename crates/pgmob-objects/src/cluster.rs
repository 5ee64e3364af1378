//! The remote-access handle.
//!
//! A [`Cluster`] owns the executor, the catalog query registry, the server
//! version and the configuration. Objects and collections borrow it for
//! every remote operation; nothing in the object model holds on to it.

use crate::change::ChangeRecord;
use crate::collection::{Collection, CollectionOrder, KeyContext};
use crate::config::ClusterConfig;
use crate::objects::{
    Column, Database, HbaRuleCollection, LargeObject, ProcedureCollection, ReplicationSlot, Role,
    Schema, Sequence, Table, View,
};
use pgmob_core::error::{Error, ExecutionError, Result};
use pgmob_core::{Executor, FromValue, Row, ServerVersion, Value};
use pgmob_sql::{CatalogQuery, Composed, Identifier, Literal, QueryRegistry, Sql, Statement, sql};
use std::fmt;

/// Which backends [`Cluster::terminate`] should end.
///
/// Empty lists do not filter. The calling backend is never terminated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminateFilter {
    pub databases: Vec<String>,
    pub exclude_databases: Vec<String>,
    pub roles: Vec<String>,
    pub exclude_roles: Vec<String>,
    pub pids: Vec<i32>,
    pub exclude_pids: Vec<i32>,
}

impl TerminateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.databases.push(name.into());
        self
    }

    pub fn exclude_database(mut self, name: impl Into<String>) -> Self {
        self.exclude_databases.push(name.into());
        self
    }

    pub fn role(mut self, name: impl Into<String>) -> Self {
        self.roles.push(name.into());
        self
    }

    pub fn exclude_role(mut self, name: impl Into<String>) -> Self {
        self.exclude_roles.push(name.into());
        self
    }

    pub fn pid(mut self, pid: i32) -> Self {
        self.pids.push(pid);
        self
    }

    pub fn exclude_pid(mut self, pid: i32) -> Self {
        self.exclude_pids.push(pid);
        self
    }

    fn statement(&self) -> Statement {
        fn clause<T: Clone + Into<Value>>(column: &str, negate: bool, items: &[T]) -> Composed {
            if items.is_empty() {
                return Composed::new();
            }
            let op = if negate { "NOT IN" } else { "IN" };
            Sql::new(format!(" AND a.{column} {op} ("))
                + Sql::new(", ").join(items.iter().cloned().map(Literal::new))
                + Sql::new(")")
        }

        let sql = Sql::new(
            "SELECT a.pid, pg_catalog.pg_terminate_backend(a.pid) \
             FROM pg_catalog.pg_stat_activity a \
             WHERE a.pid <> pg_catalog.pg_backend_pid()",
        ) + clause("datname", false, &self.databases)
            + clause("datname", true, &self.exclude_databases)
            + clause("usename", false, &self.roles)
            + clause("usename", true, &self.exclude_roles)
            + clause("pid", false, &self.pids)
            + clause("pid", true, &self.exclude_pids);
        Statement::new(sql)
    }
}

/// Handle to one Postgres server.
pub struct Cluster {
    executor: Box<dyn Executor>,
    registry: QueryRegistry,
    version: Option<ServerVersion>,
    config: ClusterConfig,
    database: Option<String>,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("version", &self.version)
            .field("database", &self.database)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Connect through `executor`.
    ///
    /// Detects the server version unless the config fixes it, records the
    /// current database and applies `application_name` and `become_role`.
    #[tracing::instrument(level = "debug", skip(executor, config))]
    pub fn connect(executor: impl Executor + 'static, config: ClusterConfig) -> Result<Self> {
        let mut cluster = Self {
            executor: Box::new(executor),
            registry: QueryRegistry::builtin(),
            version: config.server_version,
            config,
            database: None,
        };
        if cluster.version.is_none() {
            let banner: String =
                cluster.query_value(&Statement::new(Sql::new("SELECT pg_catalog.version()")))?;
            cluster.version = Some(ServerVersion::from_banner(&banner)?);
        }
        cluster.database = Some(cluster.query_value(&Statement::new(Sql::new(
            "SELECT pg_catalog.current_database()",
        )))?);
        if let Some(name) = cluster.config.application_name.clone() {
            cluster.execute(&Statement::new(sql!(
                "SET application_name = {name}",
                name = Literal::new(name)
            )?))?;
        }
        if let Some(role) = cluster.config.become_role.clone() {
            cluster.become_role(&role)?;
        }
        tracing::debug!(
            version = ?cluster.version,
            database = ?cluster.database,
            "Connected to cluster"
        );
        Ok(cluster)
    }

    /// A handle for a server of known version. No I/O.
    pub fn with_version(executor: impl Executor + 'static, version: ServerVersion) -> Self {
        Self {
            executor: Box::new(executor),
            registry: QueryRegistry::builtin(),
            version: Some(version),
            config: ClusterConfig::default().server_version(version),
            database: None,
        }
    }

    /// Replace the configuration. A version set in `config` wins.
    #[must_use]
    pub fn with_config(mut self, config: ClusterConfig) -> Self {
        if config.server_version.is_some() {
            self.version = config.server_version;
        }
        self.config = config;
        self
    }

    /// Replace the catalog query registry.
    #[must_use]
    pub fn with_registry(mut self, registry: QueryRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn version(&self) -> Option<ServerVersion> {
        self.version
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    /// Database the executor is connected to, when known.
    pub fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn key_context(&self) -> KeyContext {
        self.config.key_context()
    }

    /// The listing query for this server's version.
    pub fn catalog_query(&self, query: CatalogQuery) -> Result<Sql> {
        self.registry.resolve(query, self.version)
    }

    pub fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        let (sql, params) = statement.render()?;
        tracing::trace!(sql = %sql, params = params.len(), "Running query");
        self.executor.query(&sql, &params)
    }

    /// First column of the first row.
    pub fn query_value<T: FromValue>(&self, statement: &Statement) -> Result<T> {
        let rows = self.query(statement)?;
        let row = rows.first().ok_or_else(|| {
            Error::Execution(
                ExecutionError::new("query returned no rows").with_sql(statement.to_string()),
            )
        })?;
        row.get_as(0)
    }

    pub fn execute(&self, statement: &Statement) -> Result<u64> {
        let (sql, params) = statement.render()?;
        tracing::trace!(sql = %sql, params = params.len(), "Executing statement");
        self.executor.execute(&sql, &params)
    }

    /// Send change records to the server as one batch.
    ///
    /// The batch runs in a single transaction unless a record must run
    /// outside one; then the statements run one by one in autocommit and a
    /// failure can leave earlier statements applied.
    pub fn apply<'a>(&self, changes: impl IntoIterator<Item = &'a ChangeRecord>) -> Result<()> {
        let mut rendered = Vec::new();
        let mut transactional = true;
        for record in changes {
            rendered.push(record.statement().render()?);
            transactional &= record.is_transactional();
        }
        if rendered.is_empty() {
            return Ok(());
        }
        tracing::info!(
            statements = rendered.len(),
            transactional,
            "Applying change batch"
        );
        if transactional {
            return self.executor.execute_batch(&rendered);
        }
        for (sql, params) in &rendered {
            self.executor.execute(sql, params)?;
        }
        Ok(())
    }

    /// `SET ROLE` for the rest of the session.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn become_role(&self, role: &str) -> Result<()> {
        self.execute(&Statement::new(sql!("SET ROLE {role}", role = Identifier::new(role))?))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn reset_role(&self) -> Result<()> {
        self.execute(&Statement::new(Sql::new("RESET ROLE")))?;
        Ok(())
    }

    /// Ask the server to reload its configuration files.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn reload(&self) -> Result<()> {
        self.query(&Statement::new(Sql::new("SELECT pg_catalog.pg_reload_conf()")))?;
        Ok(())
    }

    /// Terminate the backends matching `filter`; returns the pids that
    /// were signalled.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn terminate(&self, filter: &TerminateFilter) -> Result<Vec<i32>> {
        let mut terminated = Vec::new();
        for row in self.query(&filter.statement())? {
            let pid: i32 = row.get_as(0)?;
            if row.get_as::<bool>(1)? {
                terminated.push(pid);
            }
        }
        tracing::debug!(terminated = terminated.len(), "Backends terminated");
        Ok(terminated)
    }

    /// Hand every object owned by `old_owner` in the current database to
    /// `new_owner`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn reassign_owned(&self, old_owner: &str, new_owner: &str) -> Result<()> {
        self.execute(&Statement::new(sql!(
            "REASSIGN OWNED BY {old} TO {new}",
            old = Identifier::new(old_owner),
            new = Identifier::new(new_owner),
        )?))?;
        Ok(())
    }

    pub fn roles(&self) -> Result<Collection<Role>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    pub fn databases(&self) -> Result<Collection<Database>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    pub fn schemas(&self) -> Result<Collection<Schema>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    pub fn tables(&self) -> Result<Collection<Table>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    /// Columns of `table`, in attribute-number order.
    pub fn columns(&self, table: &Table) -> Result<Collection<Column>> {
        Collection::load(self, table.table_ref(), CollectionOrder::Insertion)
    }

    pub fn views(&self) -> Result<Collection<View>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    pub fn sequences(&self) -> Result<Collection<Sequence>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    pub fn procedures(&self) -> Result<ProcedureCollection> {
        ProcedureCollection::load(self)
    }

    pub fn replication_slots(&self) -> Result<Collection<ReplicationSlot>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    pub fn large_objects(&self) -> Result<Collection<LargeObject>> {
        Collection::load(self, (), CollectionOrder::Sorted)
    }

    pub fn hba_rules(&self) -> Result<HbaRuleCollection> {
        HbaRuleCollection::load(self)
    }
}
