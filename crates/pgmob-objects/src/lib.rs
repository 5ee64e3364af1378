//! Postgres catalog objects as tracked Rust values.
//!
//! `pgmob-objects` is the **object layer**. A [`Cluster`] wraps an
//! [`Executor`](pgmob_core::Executor) and loads catalog objects into keyed
//! [`Collection`]s. Objects record attribute changes as [`ChangeRecord`]s
//! and send them in one batch on `alter`.
//!
//! ```ignore
//! let cluster = Cluster::connect(executor, ClusterConfig::default())?;
//! let mut roles = cluster.roles()?;
//! let role = roles.get_mut("app")?;
//! role.set_connection_limit(10)?;
//! role.set_login(true)?;
//! role.alter(&cluster)?;
//! ```

pub mod change;
pub mod cluster;
pub mod collection;
pub mod config;
pub mod mapper;
pub mod object;
pub mod objects;
pub mod state;

#[cfg(test)]
mod fixtures;

pub use change::{ChangeRecord, ChangeSet};
pub use cluster::{Cluster, TerminateFilter};
pub use collection::{Collection, CollectionOrder, KeyContext};
pub use config::ClusterConfig;
pub use mapper::{CatalogCode, MappedRow, RowMapper};
pub use object::{Alterable, CatalogObject};
pub use objects::*;
pub use state::{ObjectId, ObjectState};
