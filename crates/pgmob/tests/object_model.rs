//! End-to-end behavior of the object model against a scripted server.

use pgmob::prelude::*;
use pgmob_core::testing::{ScriptedExecutor, rows};

fn role_row(name: &str, oid: u32) -> Vec<Value> {
    vec![
        name.into(),
        false.into(),
        true.into(),
        false.into(),
        false.into(),
        true.into(),
        false.into(),
        Value::Int(-1),
        Value::Null,
        false.into(),
        oid.into(),
    ]
}

fn role_rows(data: Vec<Vec<Value>>) -> Vec<pgmob::Row> {
    rows(Role::MAPPER.attributes(), data)
}

fn schema_rows(data: &[(&str, &str, u32)]) -> Vec<pgmob::Row> {
    rows(
        Schema::MAPPER.attributes(),
        data.iter()
            .map(|(name, owner, oid)| vec![(*name).into(), (*owner).into(), (*oid).into()])
            .collect(),
    )
}

fn connected(exec: &ScriptedExecutor) -> Cluster {
    exec.respond(
        "pg_catalog.version()",
        rows(
            &["version"],
            vec![vec![
                "PostgreSQL 13.4 on x86_64-pc-linux-gnu, compiled by gcc".into(),
            ]],
        ),
    );
    exec.respond(
        "current_database()",
        rows(&["current_database"], vec![vec!["postgres".into()]]),
    );
    Cluster::connect(exec.clone(), ClusterConfig::default()).unwrap()
}

#[test]
fn connect_detects_version_and_database() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    assert_eq!(cluster.version(), Some(ServerVersion::new(13, 4)));
    assert_eq!(cluster.current_database(), Some("postgres"));
}

#[test]
fn roles_load_into_keyed_collection() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    exec.respond(
        "pg_roles",
        role_rows(vec![role_row("a", 10), role_row("b", 16384), role_row("c", 16385)]),
    );
    let roles = cluster.roles().unwrap();
    assert_eq!(roles.len(), 3);
    assert!(roles.contains("b"));
    assert_eq!(roles.get("b").unwrap().oid(), Some(16384));

    let err = roles.get("missing").unwrap_err();
    assert_eq!(err.usage_kind(), Some(UsageErrorKind::MissingKey));
}

#[test]
fn ephemeral_object_cannot_alter_until_created() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    let mut role = Role::new("reporter").with_login(true);
    role.set_connection_limit(5).unwrap();
    let err = role.alter(&cluster).unwrap_err();
    assert_eq!(err.usage_kind(), Some(UsageErrorKind::Ephemeral));
    assert!(role.pending_changes().is_empty());

    exec.respond("q.name = $1", role_rows(vec![role_row("reporter", 16500)]));
    role.create(&cluster, Some("s3cret")).unwrap();
    assert_eq!(role.oid(), Some(16500));
    assert_eq!(exec.batch_count(), 1);
    let created = exec.executed_sql();
    assert!(created[0].starts_with(r#"CREATE ROLE "reporter" WITH "#));
    assert!(created[0].ends_with("PASSWORD 's3cret'"));
}

#[test]
fn repeated_owner_changes_keep_one_record() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    exec.respond("pg_namespace", schema_rows(&[("app", "postgres", 16390)]));
    let mut schemas = cluster.schemas().unwrap();
    let schema = schemas.get_mut("app").unwrap();
    schema.set_owner("x").unwrap();
    schema.set_owner("y").unwrap();

    let changes = schema.pending_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(
        changes.get("owner").unwrap().statement().to_string(),
        r#"ALTER SCHEMA "app" OWNER TO "y""#
    );
}

#[test]
fn alter_applies_owner_before_rename_in_one_batch() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    exec.respond("pg_namespace", schema_rows(&[("app", "postgres", 16390)]));
    let mut schemas = cluster.schemas().unwrap();
    {
        let schema = schemas.get_mut("app").unwrap();
        schema.set_name("reporting").unwrap();
        schema.set_owner("alice").unwrap();
    }
    exec.respond("q.oid = $1", schema_rows(&[("reporting", "alice", 16390)]));
    schemas.alter(&cluster).unwrap();

    assert_eq!(exec.batch_count(), 1);
    assert_eq!(
        exec.executed_sql(),
        vec![
            r#"ALTER SCHEMA "app" OWNER TO "alice""#,
            r#"ALTER SCHEMA "app" RENAME TO "reporting""#,
        ]
    );
    assert!(schemas.pending_changes().is_empty());
}

#[test]
fn second_alter_sends_nothing() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    exec.respond("pg_namespace", schema_rows(&[("app", "postgres", 16390)]));
    let mut schema = cluster.schemas().unwrap().remove("app").unwrap();
    schema.set_owner("alice").unwrap();
    exec.respond("q.oid = $1", schema_rows(&[("app", "alice", 16390)]));

    schema.alter(&cluster).unwrap();
    schema.alter(&cluster).unwrap();
    assert_eq!(exec.batch_count(), 1);
    assert_eq!(
        exec.executed_sql(),
        vec![r#"ALTER SCHEMA "app" OWNER TO "alice""#]
    );

    assert_eq!(schema.name(), "app");
    assert_eq!(schema.owner(), Some("alice"));
    assert_eq!(schema.oid(), Some(16390));
    assert!(schema.pending_changes().is_empty());
    assert!(schema.state().original("owner").is_none());
}

#[test]
fn writing_original_value_back_cancels_change() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    exec.respond("pg_namespace", schema_rows(&[("app", "postgres", 16390)]));
    let mut schema = cluster.schemas().unwrap().remove("app").unwrap();
    schema.set_owner("alice").unwrap();
    assert_eq!(schema.pending_changes().len(), 1);
    schema.set_owner("postgres").unwrap();
    assert!(schema.pending_changes().is_empty());

    schema.alter(&cluster).unwrap();
    assert_eq!(exec.batch_count(), 0);
}

#[test]
fn failed_alter_keeps_changes_pending() {
    let exec = ScriptedExecutor::new();
    let cluster = connected(&exec);
    exec.respond("pg_namespace", schema_rows(&[("app", "postgres", 16390)]));
    let mut schema = cluster.schemas().unwrap().remove("app").unwrap();
    schema.set_owner("nobody").unwrap();
    exec.fail_with_state("OWNER TO", r#"role "nobody" does not exist"#, "42704");

    let err = schema.alter(&cluster).unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
    assert_eq!(schema.pending_changes().len(), 1);
    assert_eq!(schema.owner(), Some("nobody"));
}

#[test]
fn config_loads_from_json() {
    let exec = ScriptedExecutor::new();
    let config = ClusterConfig::from_json(
        r#"{"default_schema": "app", "server_version": "12.8", "application_name": "ops"}"#,
    )
    .unwrap();
    exec.respond(
        "current_database()",
        rows(&["current_database"], vec![vec!["postgres".into()]]),
    );
    let cluster = Cluster::connect(exec.clone(), config).unwrap();
    assert_eq!(cluster.version(), Some(ServerVersion::new(12, 8)));
    assert!(exec.query_sql().iter().all(|sql| !sql.contains("version()")));
    assert_eq!(exec.executed_sql(), vec!["SET application_name = 'ops'"]);
    assert_eq!(cluster.key_context().default_schema(), "app");
}
