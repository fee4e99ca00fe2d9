use serde::{Deserialize, Serialize};

use crate::{
    engine::ReplayError,
    form::FormArgs,
    op::OperationRecord,
    types::{ConcId, FormType},
};

use super::cache::FormArgsCache;

/// Ordered operation log plus the form-args cache keyed by its persistence ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub operations: Vec<OperationRecord>,
    pub forms_cache: FormArgsCache,
}

impl PipelineSnapshot {
    pub fn new(operations: Vec<OperationRecord>, forms_cache: FormArgsCache) -> Self {
        Self {
            operations,
            forms_cache,
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&OperationRecord> {
        self.operations.get(idx)
    }

    pub fn op_at(&self, idx: usize) -> Result<&OperationRecord, ReplayError> {
        self.operations.get(idx).ok_or(ReplayError::IndexOutOfRange {
            idx,
            len: self.operations.len(),
        })
    }

    pub fn tail_id(&self) -> Option<&str> {
        self.operations.last().map(|op| op.persistence_id.as_str())
    }

    pub fn index_of(&self, persistence_id: &str) -> Option<usize> {
        self.operations
            .iter()
            .position(|op| op.persistence_id == persistence_id)
    }

    /// Drops every step after `idx` together with its cache entry.
    pub fn trim_after(&mut self, idx: usize) -> Result<Vec<OperationRecord>, ReplayError> {
        self.op_at(idx)?;
        let removed = self.operations.split_off(idx + 1);
        for op in &removed {
            self.forms_cache.remove(&op.persistence_id);
        }
        Ok(removed)
    }

    /// Replaces the whole pipeline; previous cache entries are discarded.
    pub fn replace(&mut self, operations: Vec<OperationRecord>, forms_cache: FormArgsCache) {
        self.operations = operations;
        self.forms_cache = forms_cache;
    }

    /// Installs the operation list produced by a replay. Superseded entries are
    /// dropped by resetting the cache.
    pub fn apply_replay(&mut self, operations: Vec<OperationRecord>) {
        self.operations = operations;
        self.forms_cache.clear();
    }

    /// Appends a freshly persisted step. A new query replaces the root, which
    /// resets the whole pipeline.
    pub fn append(&mut self, record: OperationRecord, args: Option<FormArgs>) {
        if record.form_type == FormType::Query {
            self.operations.clear();
            self.forms_cache.clear();
        }
        if let Some(args) = args {
            self.forms_cache.put(record.persistence_id.clone(), args);
        }
        self.operations.push(record);
    }

    pub fn persistence_ids(&self) -> Vec<ConcId> {
        self.operations
            .iter()
            .map(|op| op.persistence_id.clone())
            .collect()
    }
}
