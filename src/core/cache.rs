use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::{
    form::FormArgs,
    op::OperationRecord,
    types::{ConcId, NEW_OP_KEY},
};

/// Persistence id -> exact arguments that reproduce that step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormArgsCache {
    entries: HashMap<ConcId, FormArgs>,
}

impl FormArgsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, persistence_id: &str) -> Option<&FormArgs> {
        self.entries.get(persistence_id)
    }

    pub fn put(&mut self, persistence_id: impl Into<ConcId>, args: FormArgs) {
        self.entries.insert(persistence_id.into(), args);
    }

    pub fn remove(&mut self, persistence_id: &str) -> Option<FormArgs> {
        self.entries.remove(persistence_id)
    }

    pub fn contains(&self, persistence_id: &str) -> bool {
        self.entries.contains_key(persistence_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// True iff every operation's persistence id has an entry.
    pub fn all_present_for(&self, operations: &[OperationRecord]) -> bool {
        operations
            .iter()
            .all(|op| self.entries.contains_key(&op.persistence_id))
    }

    /// Ids of `operations` without an entry, in pipeline order.
    pub fn missing_for<'a>(&self, operations: &'a [OperationRecord]) -> Vec<&'a str> {
        operations
            .iter()
            .filter(|op| !self.entries.contains_key(&op.persistence_id))
            .map(|op| op.persistence_id.as_str())
            .collect()
    }

    /// Drops entries no longer reachable from `operations`. The draft entry survives.
    pub fn retain_reachable(&mut self, operations: &[OperationRecord]) -> usize {
        let live: HashSet<&str> = operations
            .iter()
            .map(|op| op.persistence_id.as_str())
            .collect();
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key == NEW_OP_KEY || live.contains(key.as_str()));
        before - self.entries.len()
    }

    pub fn absorb(&mut self, entries: impl IntoIterator<Item = (ConcId, FormArgs)>) {
        self.entries.extend(entries);
    }

    pub fn draft(&self) -> Option<&FormArgs> {
        self.entries.get(NEW_OP_KEY)
    }

    pub fn put_draft(&mut self, args: FormArgs) {
        self.entries.insert(NEW_OP_KEY.to_string(), args);
    }

    pub fn take_draft(&mut self) -> Option<FormArgs> {
        self.entries.remove(NEW_OP_KEY)
    }
}
