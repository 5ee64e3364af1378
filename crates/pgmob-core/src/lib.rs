//! Core types and traits for pgmob.
//!
//! This crate provides the foundations every other pgmob crate builds on:
//!
//! - `Value` and `Row` for data crossing the execution boundary
//! - `Executor`, the synchronous execution boundary itself
//! - the `Error` taxonomy shared by the object model
//! - identifier/literal quoting and `ServerVersion`

pub mod error;
pub mod executor;
pub mod identifiers;
pub mod kind;
pub mod row;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod value;
pub mod version;

pub use error::{
    ConfigError, Error, ExecutionError, MappingError, NotFoundError, Result, TypeError,
    UsageError, UsageErrorKind,
};
pub use executor::{Executor, RenderedStatement};
pub use identifiers::{literal_sql, quote_ident, quote_literal};
pub use kind::ObjectKind;
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
pub use version::ServerVersion;

/// Object identifier assigned by the server.
pub type Oid = u32;
