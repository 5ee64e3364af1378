//! Roles.

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
use pgmob_core::ObjectKind;
use pgmob_sql::{CatalogQuery, Composable, Composed, Identifier, Literal, Placeholder, Sql, Statement, sql};

const ATTRIBUTES: &[&str] = &[
    "name",
    "superuser",
    "inherit",
    "createrole",
    "createdb",
    "login",
    "replication",
    "connection_limit",
    "valid_until",
    "bypassrls",
    "oid",
];

const ORDER: &[&str] = &[
    "superuser",
    "inherit",
    "createrole",
    "createdb",
    "login",
    "replication",
    "bypassrls",
    "connection_limit",
    "valid_until",
    "name",
];

/// A login or group role.
#[derive(Debug, Clone)]
pub struct Role {
    state: ObjectState,
    name: String,
    superuser: bool,
    inherit: bool,
    createrole: bool,
    createdb: bool,
    login: bool,
    replication: bool,
    bypassrls: bool,
    connection_limit: i32,
    valid_until: Option<String>,
}

fn flag(on: bool, keyword: &str) -> Composed {
    if on {
        Sql::new(keyword).compose()
    } else {
        Sql::new(format!("NO{keyword}")).compose()
    }
}

impl Role {
    /// A role that does not exist on the server yet, with Postgres'
    /// `CREATE ROLE` defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: ObjectState::ephemeral(ObjectKind::Role, ORDER),
            name: name.into(),
            superuser: false,
            inherit: true,
            createrole: false,
            createdb: false,
            login: false,
            replication: false,
            bypassrls: false,
            connection_limit: -1,
            valid_until: None,
        }
    }

    #[must_use]
    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    #[must_use]
    pub fn with_inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    #[must_use]
    pub fn with_createrole(mut self, createrole: bool) -> Self {
        self.createrole = createrole;
        self
    }

    #[must_use]
    pub fn with_createdb(mut self, createdb: bool) -> Self {
        self.createdb = createdb;
        self
    }

    #[must_use]
    pub fn with_login(mut self, login: bool) -> Self {
        self.login = login;
        self
    }

    #[must_use]
    pub fn with_replication(mut self, replication: bool) -> Self {
        self.replication = replication;
        self
    }

    #[must_use]
    pub fn with_bypassrls(mut self, bypassrls: bool) -> Self {
        self.bypassrls = bypassrls;
        self
    }

    #[must_use]
    pub fn with_connection_limit(mut self, limit: i32) -> Self {
        self.connection_limit = limit;
        self
    }

    #[must_use]
    pub fn with_valid_until(mut self, valid_until: impl Into<String>) -> Self {
        self.valid_until = Some(valid_until.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superuser(&self) -> bool {
        self.superuser
    }

    pub fn inherit(&self) -> bool {
        self.inherit
    }

    pub fn createrole(&self) -> bool {
        self.createrole
    }

    pub fn createdb(&self) -> bool {
        self.createdb
    }

    pub fn login(&self) -> bool {
        self.login
    }

    pub fn replication(&self) -> bool {
        self.replication
    }

    pub fn bypassrls(&self) -> bool {
        self.bypassrls
    }

    /// `-1` means no limit.
    pub fn connection_limit(&self) -> i32 {
        self.connection_limit
    }

    pub fn valid_until(&self) -> Option<&str> {
        self.valid_until.as_deref()
    }

    pub fn oid(&self) -> Option<u32> {
        self.state.oid()
    }

    tracked_setters! {
        set_name(name: String),
        set_superuser(superuser: bool),
        set_inherit(inherit: bool),
        set_createrole(createrole: bool),
        set_createdb(createdb: bool),
        set_login(login: bool),
        set_replication(replication: bool),
        set_bypassrls(bypassrls: bool),
        /// `-1` removes the limit.
        set_connection_limit(connection_limit: i32),
        /// `None` makes the password valid forever.
        set_valid_until(valid_until: Option<String>),
    }

    fn remote_ident(&self) -> Identifier {
        Identifier::new(self.state.remote_text("name", &self.name))
    }

    fn create_statement(&self, password: Option<&str>) -> Result<ChangeRecord> {
        let mut options = vec![
            flag(self.superuser, "SUPERUSER"),
            flag(self.inherit, "INHERIT"),
            flag(self.createrole, "CREATEROLE"),
            flag(self.createdb, "CREATEDB"),
            flag(self.login, "LOGIN"),
            flag(self.replication, "REPLICATION"),
            flag(self.bypassrls, "BYPASSRLS"),
            Sql::new("CONNECTION LIMIT ") + Literal::new(self.connection_limit),
        ];
        if let Some(valid_until) = &self.valid_until {
            options.push(Sql::new("VALID UNTIL ") + Literal::new(valid_until));
        }
        if let Some(password) = password {
            options.push(Sql::new("PASSWORD ") + Literal::new(password));
        }
        let statement = sql!(
            "CREATE ROLE {name} WITH {options}",
            name = Identifier::new(&self.name),
            options = Sql::new(" ").join(options),
        )?;
        Ok(ChangeRecord::new(self.label(), "create", statement.into()))
    }

    /// Create the role, optionally with a password, and load it back.
    pub fn create(&mut self, cluster: &Cluster, password: Option<&str>) -> Result<()> {
        let records = vec![self.create_statement(password)?];
        let lookup = lookup_by_name::<Self>(cluster, None, &self.name)?;
        create_with(self, cluster, records, &lookup)
    }

    pub fn drop(&mut self, cluster: &Cluster) -> Result<()> {
        let statement = sql!("DROP ROLE {role}", role = self.remote_ident())?;
        drop_with(self, cluster, statement, false)
    }

    /// The `CREATE ROLE` statement for this role, without a password.
    pub fn script(&self) -> Result<String> {
        script_of(&[self.create_statement(None)?])
    }

    /// Set a new password right away.
    #[tracing::instrument(level = "debug", skip(self, cluster, password), fields(role = %self.name))]
    pub fn change_password(&self, cluster: &Cluster, password: &str) -> Result<()> {
        self.state.ensure_alterable(&self.label())?;
        cluster.execute(&Statement::new(sql!(
            "ALTER ROLE {role} PASSWORD {password}",
            role = self.remote_ident(),
            password = Literal::new(password),
        )?))?;
        Ok(())
    }

    /// The stored password hash. Needs superuser rights to read `pg_authid`.
    pub fn password_md5(&self, cluster: &Cluster) -> Result<Option<String>> {
        self.state.ensure_alterable(&self.label())?;
        cluster.query_value(
            &Statement::new(
                Sql::new("SELECT rolpassword FROM pg_catalog.pg_authid WHERE oid = ") + Placeholder,
            )
            .bind(self.oid()),
        )
    }
}

impl CatalogObject for Role {
    type Key = String;
    type Scope = ();

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Role, ATTRIBUTES);
    const QUERY: CatalogQuery = CatalogQuery::Roles;

    fn state(&self) -> &ObjectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn label(&self) -> String {
        format!("Role('{}')", self.name)
    }

    fn key(&self, _context: &KeyContext) -> String {
        self.name.clone()
    }

    fn parse_key(raw: &str, _context: &KeyContext) -> Option<String> {
        Some(raw.to_string())
    }

    fn from_row(row: &MappedRow<'_>, _scope: &()) -> Result<Self> {
        Ok(Self {
            state: ObjectState::persisted(ObjectKind::Role, ORDER, ObjectId::Oid(row.get("oid")?)),
            name: row.get("name")?,
            superuser: row.get("superuser")?,
            inherit: row.get("inherit")?,
            createrole: row.get("createrole")?,
            createdb: row.get("createdb")?,
            login: row.get("login")?,
            replication: row.get("replication")?,
            bypassrls: row.get("bypassrls")?,
            connection_limit: row.get("connection_limit")?,
            valid_until: row.get("valid_until")?,
        })
    }

    fn scope(&self) {}
}

impl Alterable for Role {
    const ALTER_ORDER: &'static [&'static str] = ORDER;

    fn alter_statement(&self, attribute: &'static str) -> Result<ChangeRecord> {
        let clause = match attribute {
            "superuser" => flag(self.superuser, "SUPERUSER"),
            "inherit" => flag(self.inherit, "INHERIT"),
            "createrole" => flag(self.createrole, "CREATEROLE"),
            "createdb" => flag(self.createdb, "CREATEDB"),
            "login" => flag(self.login, "LOGIN"),
            "replication" => flag(self.replication, "REPLICATION"),
            "bypassrls" => flag(self.bypassrls, "BYPASSRLS"),
            "connection_limit" => {
                Sql::new("CONNECTION LIMIT ") + Literal::new(self.connection_limit)
            }
            "valid_until" => {
                Sql::new("VALID UNTIL ")
                    + Literal::new(self.valid_until.as_deref().unwrap_or("infinity"))
            }
            "name" => Sql::new("RENAME TO ") + Identifier::new(&self.name),
            other => return Err(no_template(self.label(), other)),
        };
        let role = Identifier::new(self.state.text_at(attribute, "name", &self.name));
        let statement = sql!("ALTER ROLE {role} {clause}", role = role, clause = clause)?;
        Ok(ChangeRecord::new(self.label(), attribute, statement.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pgmob_core::testing::ScriptedExecutor;
    use pgmob_core::{Error, UsageErrorKind};

    fn loaded(exec: &ScriptedExecutor) -> (Cluster, Role) {
        exec.respond("pg_roles", fixtures::roles(vec![fixtures::role("alice", 16384)]));
        let cluster = fixtures::cluster(exec);
        let role = cluster.roles().unwrap().remove("alice").unwrap();
        (cluster, role)
    }

    #[test]
    fn test_from_row() {
        let exec = ScriptedExecutor::new();
        let (_, role) = loaded(&exec);
        assert_eq!(role.name(), "alice");
        assert!(role.inherit());
        assert!(role.login());
        assert!(!role.superuser());
        assert_eq!(role.connection_limit(), -1);
        assert_eq!(role.valid_until(), None);
        assert_eq!(role.oid(), Some(16384));
        assert_eq!(role.label(), "Role('alice')");
    }

    #[test]
    fn test_setters_record_changes_without_io() {
        let exec = ScriptedExecutor::new();
        let (_, mut role) = loaded(&exec);
        let queries = exec.query_sql().len();

        role.set_inherit(false).unwrap();
        role.set_name("bob").unwrap();
        role.set_connection_limit(5).unwrap();
        assert!(!role.inherit());
        assert_eq!(role.name(), "bob");
        assert_eq!(exec.query_sql().len(), queries);
        assert!(exec.executed_sql().is_empty());

        let statements: Vec<String> = role
            .pending_changes()
            .iter()
            .map(|c| c.statement().to_string())
            .collect();
        assert_eq!(
            statements,
            vec![
                r#"ALTER ROLE "alice" NOINHERIT"#,
                r#"ALTER ROLE "alice" CONNECTION LIMIT 5"#,
                r#"ALTER ROLE "alice" RENAME TO "bob""#,
            ]
        );
    }

    #[test]
    fn test_same_value_is_noop() {
        let exec = ScriptedExecutor::new();
        let (_, mut role) = loaded(&exec);
        role.set_login(true).unwrap();
        role.set_name("alice").unwrap();
        assert!(role.pending_changes().is_empty());
    }

    #[test]
    fn test_valid_until() {
        let exec = ScriptedExecutor::new();
        let (_, mut role) = loaded(&exec);
        role.set_valid_until(Some("2030-01-01".to_string())).unwrap();
        assert_eq!(
            role.pending_changes().get("valid_until").unwrap().statement().to_string(),
            r#"ALTER ROLE "alice" VALID UNTIL '2030-01-01'"#
        );
        role.set_valid_until(None).unwrap();
        assert!(role.pending_changes().is_empty());
    }

    #[test]
    fn test_alter_then_refresh() {
        let exec = ScriptedExecutor::new();
        let (cluster, mut role) = loaded(&exec);
        role.set_superuser(true).unwrap();

        let mut row = fixtures::role("alice", 16384);
        row[1] = true.into();
        exec.respond("q.oid = $1", fixtures::roles(vec![row]));
        role.alter(&cluster).unwrap();

        assert_eq!(exec.executed_sql(), vec![r#"ALTER ROLE "alice" SUPERUSER"#]);
        assert!(role.superuser());
        assert!(role.pending_changes().is_empty());
    }

    #[test]
    fn test_create_with_password() {
        let exec = ScriptedExecutor::new();
        exec.respond("q.name = $1", fixtures::roles(vec![fixtures::role("carol", 16500)]));
        let cluster = fixtures::cluster(&exec);

        let mut role = Role::new("carol")
            .with_superuser(true)
            .with_connection_limit(20);
        let err = role.alter(&cluster).unwrap_err();
        assert_eq!(err.usage_kind(), Some(UsageErrorKind::Ephemeral));

        role.create(&cluster, Some("s3cret")).unwrap();
        assert_eq!(
            exec.executed_sql(),
            vec![
                "CREATE ROLE \"carol\" WITH SUPERUSER INHERIT NOCREATEROLE NOCREATEDB NOLOGIN \
                 NOREPLICATION NOBYPASSRLS CONNECTION LIMIT 20 PASSWORD 's3cret'"
            ]
        );
        assert_eq!(role.oid(), Some(16500));
        assert!(!role.state().is_ephemeral());

        let err = role.create(&cluster, None).unwrap_err();
        assert_eq!(err.usage_kind(), Some(UsageErrorKind::AlreadyCreated));
    }

    #[test]
    fn test_script_omits_password() {
        let script = Role::new("dave").with_login(true).script().unwrap();
        assert!(script.starts_with("CREATE ROLE \"dave\" WITH NOSUPERUSER INHERIT"));
        assert!(script.contains(" LOGIN "));
        assert!(!script.contains("PASSWORD"));
    }

    #[test]
    fn test_drop_uses_server_name() {
        let exec = ScriptedExecutor::new();
        let (cluster, mut role) = loaded(&exec);
        role.set_name("renamed").unwrap();
        role.drop(&cluster).unwrap();
        assert_eq!(exec.executed_sql(), vec![r#"DROP ROLE "alice""#]);
        assert!(role.state().is_dropped());

        let err = role.set_login(false).unwrap_err();
        assert_eq!(err.usage_kind(), Some(UsageErrorKind::Dropped));
        assert!(matches!(role.drop(&cluster), Err(Error::Usage(_))));
    }

    #[test]
    fn test_change_password_and_hash() {
        let exec = ScriptedExecutor::new();
        let (cluster, role) = loaded(&exec);
        exec.respond(
            "pg_authid",
            pgmob_core::testing::rows(&["rolpassword"], vec![vec!["md5abc".into()]]),
        );
        role.change_password(&cluster, "n'ew").unwrap();
        assert_eq!(
            exec.executed_sql(),
            vec![r#"ALTER ROLE "alice" PASSWORD 'n''ew'"#]
        );
        assert_eq!(
            role.password_md5(&cluster).unwrap().as_deref(),
            Some("md5abc")
        );
    }
}
