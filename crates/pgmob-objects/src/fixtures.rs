//! Canned catalog rows shared by the unit tests.

use crate::Cluster;
use crate::object::CatalogObject;
use crate::objects::{
    Column, Database, LargeObject, Procedure, ReplicationSlot, Role, Schema, Sequence, Table, View,
};
use pgmob_core::testing::{ScriptedExecutor, rows};
use pgmob_core::{Row, ServerVersion, Value};

pub fn cluster(exec: &ScriptedExecutor) -> Cluster {
    Cluster::with_version(exec.clone(), ServerVersion::new(13, 4))
}

/// Rows named after `O`'s attributes.
pub fn rows_of<O: CatalogObject>(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows(O::MAPPER.attributes(), data)
}

pub fn role(name: &str, oid: u32) -> Vec<Value> {
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

pub fn roles(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<Role>(data)
}

pub fn database(name: &str, owner: &str, oid: u32) -> Vec<Value> {
    vec![
        name.into(),
        owner.into(),
        "UTF8".into(),
        "en_US.UTF-8".into(),
        "en_US.UTF-8".into(),
        false.into(),
        true.into(),
        Value::Int(-1),
        Value::BigInt(13_756),
        Value::BigInt(726),
        Value::BigInt(1),
        "pg_default".into(),
        Value::Null,
        oid.into(),
    ]
}

pub fn databases(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<Database>(data)
}

pub fn schema(name: &str, owner: &str, oid: u32) -> Vec<Value> {
    vec![name.into(), owner.into(), oid.into()]
}

pub fn schemas(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<Schema>(data)
}

pub fn table(schema: &str, name: &str, owner: &str, oid: u32) -> Vec<Value> {
    vec![
        name.into(),
        owner.into(),
        schema.into(),
        Value::Null,
        false.into(),
        oid.into(),
    ]
}

pub fn tables(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<Table>(data)
}

pub fn column(name: &str, type_name: &str, number: i16) -> Vec<Value> {
    vec![
        name.into(),
        type_name.into(),
        Value::Int(-1),
        Value::SmallInt(number),
        false.into(),
        Value::Int(-1),
        true.into(),
        false.into(),
        "".into(),
        "".into(),
        Value::Null,
        Value::Null,
    ]
}

pub fn columns(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<Column>(data)
}

pub fn view(schema: &str, name: &str, owner: &str, oid: u32) -> Vec<Value> {
    vec![
        name.into(),
        owner.into(),
        schema.into(),
        " SELECT orders.id\n   FROM orders;".into(),
        oid.into(),
    ]
}

pub fn views(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<View>(data)
}

pub fn sequence(schema: &str, name: &str, owner: &str, oid: u32) -> Vec<Value> {
    vec![
        name.into(),
        owner.into(),
        schema.into(),
        "bigint".into(),
        Value::BigInt(1),
        Value::BigInt(1),
        Value::BigInt(i64::MAX),
        Value::BigInt(1),
        false.into(),
        Value::BigInt(1),
        Value::Null,
        oid.into(),
    ]
}

pub fn sequences(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<Sequence>(data)
}

pub fn procedure(oid: u32, schema: &str, name: &str, kind: &str, args: &[&str]) -> Vec<Value> {
    vec![
        oid.into(),
        name.into(),
        schema.into(),
        "postgres".into(),
        "plpgsql".into(),
        kind.into(),
        false.into(),
        false.into(),
        false.into(),
        "v".into(),
        "u".into(),
        Value::Array(args.iter().map(|a| Value::from(*a)).collect()),
    ]
}

pub fn procedures(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<Procedure>(data)
}

pub fn slot(name: &str, plugin: Option<&str>, active_pid: Option<i32>) -> Vec<Value> {
    let slot_type = if plugin.is_some() { "logical" } else { "physical" };
    vec![
        name.into(),
        plugin.map(str::to_string).into(),
        slot_type.into(),
        plugin.map(|_| "app".to_string()).into(),
        false.into(),
        active_pid.is_some().into(),
        active_pid.into(),
        Value::Null,
        Value::Null,
        "0/1660B20".into(),
        Value::Null,
    ]
}

pub fn slots(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<ReplicationSlot>(data)
}

pub fn large_object(oid: u32, owner: &str) -> Vec<Value> {
    vec![oid.into(), owner.into()]
}

pub fn large_objects(data: Vec<Vec<Value>>) -> Vec<Row> {
    rows_of::<LargeObject>(data)
}
