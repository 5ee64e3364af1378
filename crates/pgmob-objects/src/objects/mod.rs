//! One module per catalog object kind.

mod databases;
mod hba_rules;
mod large_objects;
mod procedures;
mod replication_slots;
mod roles;
mod schemas;
mod sequences;
mod tables;
mod views;

pub use databases::Database;
pub use hba_rules::{HbaRule, HbaRuleCollection};
pub use large_objects::{LargeObject, LargeObjectKey};
pub use procedures::{
    ParallelSafety, Procedure, ProcedureCollection, ProcedureKind, ProcedureVariations, Volatility,
};
pub use replication_slots::{ReplicationSlot, SlotType};
pub use roles::Role;
pub use schemas::Schema;
pub use sequences::Sequence;
pub use tables::{Column, ColumnIdentity, GeneratedColumn, Table, TableRef};
pub use views::View;
