//! pgmob - Postgres catalog objects as tracked Rust values.
//!
//! pgmob loads server-level catalog objects (roles, databases, schemas,
//! tables, views, sequences, routines, replication slots, large objects
//! and `pg_hba.conf` rules) into keyed collections. Setting an attribute
//! records the statement that would apply it; `alter` sends the pending
//! statements in one transaction and reloads the object.
//!
//! # Quick Start
//!
//! ```ignore
//! use pgmob::prelude::*;
//!
//! fn rename_schema(executor: impl Executor + 'static) -> Result<()> {
//!     let cluster = Cluster::connect(executor, ClusterConfig::default())?;
//!     let mut schemas = cluster.schemas()?;
//!     let schema = schemas.get_mut("staging")?;
//!     schema.set_owner("etl")?;
//!     schema.set_name("landing")?;
//!     // ALTER SCHEMA "staging" OWNER TO "etl";
//!     // ALTER SCHEMA "staging" RENAME TO "landing"
//!     schema.alter(&cluster)
//! }
//! ```
//!
//! # Layers
//!
//! - [`pgmob_core`]: values, rows, the [`Executor`] boundary and errors
//! - [`pgmob_sql`]: typed statement composition and versioned listings
//! - [`pgmob_objects`]: the object model, collections and change tracking
//!
//! The crate does not open connections itself. Implement [`Executor`] over
//! the driver of your choice.

pub use pgmob_core::{
    ConfigError, Error, ExecutionError, Executor, FromValue, MappingError, NotFoundError,
    ObjectKind, Oid, RenderedStatement, Result, Row, ServerVersion, TypeError, UsageError,
    UsageErrorKind, Value,
};

#[cfg(feature = "testing")]
pub use pgmob_core::testing;

pub use pgmob_sql::{
    CatalogQuery, Composable, Composed, Identifier, Literal, Placeholder, QueryRegistry, Sql,
    Statement, sql,
};

pub use pgmob_objects::{
    Alterable, CatalogCode, CatalogObject, ChangeRecord, ChangeSet, Cluster, ClusterConfig,
    Collection, CollectionOrder, Column, ColumnIdentity, Database, GeneratedColumn, HbaRule,
    HbaRuleCollection, KeyContext, LargeObject, LargeObjectKey, ObjectId, ObjectState,
    ParallelSafety, Procedure, ProcedureCollection, ProcedureKind, ProcedureVariations,
    ReplicationSlot, Role, Schema, Sequence, SlotType, Table, TableRef, TerminateFilter, View,
    Volatility,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use pgmob::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Object model
        Alterable,
        CatalogObject,
        // Cluster
        Cluster,
        ClusterConfig,
        Collection,
        Column,
        Database,
        // Errors
        Error,
        Executor,
        HbaRule,
        HbaRuleCollection,
        LargeObject,
        Procedure,
        ProcedureCollection,
        ReplicationSlot,
        Result,
        Role,
        Schema,
        Sequence,
        ServerVersion,
        Table,
        TerminateFilter,
        UsageErrorKind,
        Value,
        View,
        // Statements
        sql,
    };
}
