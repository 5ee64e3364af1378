//! Catalog object kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag carried by every mirrored catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Table,
    Column,
    Role,
    Schema,
    Sequence,
    Database,
    View,
    Procedure,
    Function,
    ReplicationSlot,
    LargeObject,
    HbaRule,
}

impl ObjectKind {
    /// The keyword Postgres uses for this kind in DDL.
    pub const fn keyword(self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::Column => "COLUMN",
            ObjectKind::Role => "ROLE",
            ObjectKind::Schema => "SCHEMA",
            ObjectKind::Sequence => "SEQUENCE",
            ObjectKind::Database => "DATABASE",
            ObjectKind::View => "VIEW",
            ObjectKind::Procedure => "PROCEDURE",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::ReplicationSlot => "REPLICATION SLOT",
            ObjectKind::LargeObject => "LARGE OBJECT",
            ObjectKind::HbaRule => "HBA RULE",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
