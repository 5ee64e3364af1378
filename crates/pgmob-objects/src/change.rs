//! Deferred mutations and their per-object ordering.
//!
//! Each tracked attribute of an object contributes at most one
//! [`ChangeRecord`]. A [`ChangeSet`] keeps them in the object kind's declared
//! apply order, so reconciliation never has to sort.

use pgmob_sql::Statement;

/// One deferred mutation: the statement that moves one attribute of one
/// object to its in-memory value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Display label of the owning object
    object: String,
    attribute: &'static str,
    statement: Statement,
    transactional: bool,
}

impl ChangeRecord {
    pub fn new(object: impl Into<String>, attribute: &'static str, statement: Statement) -> Self {
        Self {
            object: object.into(),
            attribute,
            statement,
            transactional: true,
        }
    }

    /// Mark the statement as one Postgres refuses inside a transaction
    /// block, e.g. `ALTER DATABASE .. SET TABLESPACE`.
    pub fn outside_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn attribute(&self) -> &'static str {
        self.attribute
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }
}

/// Pending changes of one object, keyed by attribute, in apply order.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    order: &'static [&'static str],
    records: Vec<ChangeRecord>,
}

impl ChangeSet {
    /// An empty set ordered by `order`.
    pub fn new(order: &'static [&'static str]) -> Self {
        Self {
            order,
            records: Vec::new(),
        }
    }

    /// Declared apply order of the owning kind.
    pub fn order(&self) -> &'static [&'static str] {
        self.order
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The pending record for `attribute`, if any.
    pub fn get(&self, attribute: &str) -> Option<&ChangeRecord> {
        self.records.iter().find(|r| r.attribute == attribute)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.get(attribute).is_some()
    }

    /// Records in apply order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }

    /// Attributes with a pending record, in apply order.
    pub fn attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.records.iter().map(|r| r.attribute)
    }

    /// Does `a` apply strictly before `b`?
    pub fn precedes(&self, a: &str, b: &str) -> bool {
        self.rank(a) < self.rank(b)
    }

    fn rank(&self, attribute: &str) -> usize {
        self.order
            .iter()
            .position(|a| *a == attribute)
            .unwrap_or(self.order.len())
    }

    /// Insert `record`, replacing any earlier record for the same attribute.
    pub(crate) fn upsert(&mut self, record: ChangeRecord) {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.attribute == record.attribute)
        {
            *existing = record;
            return;
        }
        let rank = self.rank(record.attribute);
        let pos = self
            .records
            .iter()
            .position(|r| self.rank(r.attribute) > rank)
            .unwrap_or(self.records.len());
        self.records.insert(pos, record);
    }

    /// Replace every record at once.
    pub(crate) fn replace(&mut self, records: Vec<ChangeRecord>) {
        self.records.clear();
        for record in records {
            self.upsert(record);
        }
    }

    pub(crate) fn remove(&mut self, attribute: &str) -> Option<ChangeRecord> {
        let pos = self.records.iter().position(|r| r.attribute == attribute)?;
        Some(self.records.remove(pos))
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
