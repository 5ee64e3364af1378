//! Per-object tracking state.
//!
//! Every mirrored object embeds an [`ObjectState`]: its remote identity (or
//! none, while ephemeral), its pending [`ChangeSet`] and the baseline values
//! of the attributes that currently have a pending change.

use crate::change::ChangeSet;
use pgmob_core::error::{Result, UsageError, UsageErrorKind};
use pgmob_core::{ObjectKind, Oid, Value};
use std::collections::HashMap;
use std::fmt;

/// How the server identifies an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectId {
    Oid(Oid),
    /// Objects without an oid, such as replication slots
    Name(String),
    /// A column: owning table oid and attribute number
    Column { table: Oid, number: i16 },
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Oid(oid) => write!(f, "{}", oid),
            ObjectId::Name(name) => write!(f, "'{}'", name),
            ObjectId::Column { table, number } => write!(f, "{}:{}", table, number),
        }
    }
}

/// Identity, pending changes and baseline of one object.
#[derive(Debug, Clone)]
pub struct ObjectState {
    kind: ObjectKind,
    id: Option<ObjectId>,
    changes: ChangeSet,
    baseline: HashMap<&'static str, Value>,
    dropped: bool,
}

impl ObjectState {
    /// State of an object that does not exist remotely yet.
    pub fn ephemeral(kind: ObjectKind, order: &'static [&'static str]) -> Self {
        Self {
            kind,
            id: None,
            changes: ChangeSet::new(order),
            baseline: HashMap::new(),
            dropped: false,
        }
    }

    /// State of an object loaded from the server.
    pub fn persisted(kind: ObjectKind, order: &'static [&'static str], id: ObjectId) -> Self {
        Self {
            id: Some(id),
            ..Self::ephemeral(kind, order)
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    /// The object id, for kinds identified by oid.
    pub fn oid(&self) -> Option<Oid> {
        match self.id {
            Some(ObjectId::Oid(oid)) => Some(oid),
            _ => None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub(crate) fn changes_mut(&mut self) -> &mut ChangeSet {
        &mut self.changes
    }

    /// Is `attribute` waiting to be applied?
    pub fn is_dirty(&self, attribute: &str) -> bool {
        self.changes.contains(attribute)
    }

    /// The value `attribute` held before its pending change.
    pub fn original(&self, attribute: &str) -> Option<&Value> {
        self.baseline.get(attribute)
    }

    /// The text value of `attribute` seen by the statement applied for
    /// `turn`: the pending value when `attribute` is applied earlier, the
    /// original value otherwise.
    pub fn text_at<'a>(&'a self, turn: &str, attribute: &str, current: &'a str) -> &'a str {
        if self.changes.precedes(attribute, turn) {
            return current;
        }
        self.remote_text(attribute, current)
    }

    /// The text value of `attribute` as the server has it now.
    pub fn remote_text<'a>(&'a self, attribute: &str, current: &'a str) -> &'a str {
        self.baseline
            .get(attribute)
            .and_then(Value::as_str)
            .unwrap_or(current)
    }

    pub(crate) fn baseline_mut(&mut self) -> &mut HashMap<&'static str, Value> {
        &mut self.baseline
    }

    pub(crate) fn assign_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    pub(crate) fn mark_dropped(&mut self) {
        self.dropped = true;
        self.reset();
    }

    /// Forget pending changes; current values become the new baseline.
    pub(crate) fn reset(&mut self) {
        self.changes.clear();
        self.baseline.clear();
    }

    pub(crate) fn ensure_live(&self, label: &str) -> Result<()> {
        if self.dropped {
            return Err(UsageError::new(UsageErrorKind::Dropped, "object was dropped")
                .on(label)
                .into());
        }
        Ok(())
    }

    /// Alteration needs an existing, live object.
    pub(crate) fn ensure_alterable(&self, label: &str) -> Result<()> {
        self.ensure_live(label)?;
        if self.is_ephemeral() {
            return Err(UsageError::new(
                UsageErrorKind::Ephemeral,
                "object does not exist on the server yet; create it instead of altering it",
            )
            .on(label)
            .into());
        }
        Ok(())
    }

    /// Creation needs an ephemeral, live object.
    pub(crate) fn ensure_creatable(&self, label: &str) -> Result<()> {
        self.ensure_live(label)?;
        if let Some(id) = &self.id {
            return Err(UsageError::new(
                UsageErrorKind::AlreadyCreated,
                format!("object already exists with id {id}"),
            )
            .on(label)
            .into());
        }
        Ok(())
    }
}
