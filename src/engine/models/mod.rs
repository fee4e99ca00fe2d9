//! One sub-model per operation type, dispatched through [`ModelRegistry`].

mod filter;
mod query;
mod simple;
mod sort;
mod url_ops;

pub use filter::FilterModel;
pub use query::QueryModel;
pub use simple::{FirstHitsModel, SampleModel, SwitchMainCorpusModel};
pub use sort::{MultiLevelSort, SingleLevelSort, SortConfig, SortKind, SortLevel, SortModel};
pub use url_ops::{LockedModel, UrlOperationModel};

use hashbrown::HashMap;

use crate::{
    form::FormArgs,
    op::OperationRecord,
    types::{ConcId, FormType},
};

use super::{traits::OperationModel, ReplayError};

/// Editable per-operation form state of one sub-model.
#[derive(Debug, Clone)]
pub struct FormStates<T> {
    forms: HashMap<String, T>,
}

impl<T> Default for FormStates<T> {
    fn default() -> Self {
        Self {
            forms: HashMap::new(),
        }
    }
}

impl<T: Clone> FormStates<T> {
    pub fn get(&self, op_key: &str) -> Result<&T, ReplayError> {
        self.forms.get(op_key).ok_or_else(|| ReplayError::MissingFormArgs {
            op_key: op_key.to_string(),
        })
    }

    pub fn set(&mut self, op_key: &str, form: T) {
        self.forms.insert(op_key.to_string(), form);
    }

    pub fn remove(&mut self, op_key: &str) -> Option<T> {
        self.forms.remove(op_key)
    }

    pub fn rekey(&mut self, from: &str, to: &str) {
        if let Some(form) = self.forms.remove(from) {
            self.forms.insert(to.to_string(), form);
        }
    }

    pub fn contains(&self, op_key: &str) -> bool {
        self.forms.contains_key(op_key)
    }
}

pub(crate) fn mismatch(expected: FormType, args: &FormArgs) -> ReplayError {
    ReplayError::SyncTypeMismatch {
        expected,
        found: args.form_type(),
    }
}

/// Lookup table from operation type to its sub-model, built once at startup.
#[derive(Debug)]
pub struct ModelRegistry {
    pub query: QueryModel,
    pub filter: FilterModel,
    pub sort: SortModel,
    pub sample: SampleModel,
    pub switch_main_corpus: SwitchMainCorpusModel,
    pub first_hits: FirstHitsModel,
    shuffle: UrlOperationModel,
    subhits: UrlOperationModel,
    locked: LockedModel,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            query: QueryModel::default(),
            filter: FilterModel::default(),
            sort: SortModel::default(),
            sample: SampleModel::default(),
            switch_main_corpus: SwitchMainCorpusModel::default(),
            first_hits: FirstHitsModel::default(),
            shuffle: UrlOperationModel::shuffle(),
            subhits: UrlOperationModel::subhits(),
            locked: LockedModel,
        }
    }

    pub fn get(&self, form_type: FormType) -> &dyn OperationModel {
        match form_type {
            FormType::Query => &self.query,
            FormType::Filter => &self.filter,
            FormType::Sort => &self.sort,
            FormType::Sample => &self.sample,
            FormType::Shuffle => &self.shuffle,
            FormType::SwitchMainCorpus => &self.switch_main_corpus,
            FormType::Subhits => &self.subhits,
            FormType::FirstHits => &self.first_hits,
            FormType::Locked => &self.locked,
        }
    }

    pub fn get_mut(&mut self, form_type: FormType) -> &mut dyn OperationModel {
        match form_type {
            FormType::Query => &mut self.query,
            FormType::Filter => &mut self.filter,
            FormType::Sort => &mut self.sort,
            FormType::Sample => &mut self.sample,
            FormType::Shuffle => &mut self.shuffle,
            FormType::SwitchMainCorpus => &mut self.switch_main_corpus,
            FormType::Subhits => &mut self.subhits,
            FormType::FirstHits => &mut self.first_hits,
            FormType::Locked => &mut self.locked,
        }
    }

    /// Stores user-edited args for `op_key` in the sub-model of the args' type.
    pub fn set_form(&mut self, op_key: &str, args: FormArgs) -> Result<(), ReplayError> {
        let form_type = args.form_type();
        self.get_mut(form_type).sync_from(op_key, args).map(|_| ())
    }

    pub fn forget(&mut self, op_key: &str) {
        for form_type in FormType::ALL {
            self.get_mut(form_type).forget(op_key);
        }
    }

    pub fn rekey(&mut self, from: &str, to: &str) {
        for form_type in FormType::ALL {
            self.get_mut(form_type).rekey(from, to);
        }
    }

    /// Forgets the state of every id in `previous` that no longer appears in
    /// `operations`. Returns how many ids were dropped.
    pub fn forget_missing(&mut self, previous: &[ConcId], operations: &[OperationRecord]) -> usize {
        let mut dropped = 0;
        for id in previous {
            if !operations.iter().any(|op| &op.persistence_id == id) {
                self.forget(id);
                dropped += 1;
            }
        }
        dropped
    }

    pub fn has_form(&self, op_key: &str) -> bool {
        FormType::ALL
            .into_iter()
            .any(|form_type| self.get(form_type).form(op_key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::SampleFormArgs;

    #[test]
    fn registry_is_exhaustive() {
        let registry = ModelRegistry::new();
        for form_type in FormType::ALL {
            assert_eq!(registry.get(form_type).form_type(), form_type);
        }
    }

    #[test]
    fn sync_rejects_foreign_payload() {
        let mut registry = ModelRegistry::new();
        let err = registry
            .get_mut(FormType::Filter)
            .sync_from("a", FormArgs::Sample(SampleFormArgs { rlines: 5 }))
            .expect_err("mismatch");
        assert_eq!(
            err,
            ReplayError::SyncTypeMismatch {
                expected: FormType::Filter,
                found: FormType::Sample,
            }
        );
    }

    #[test]
    fn locked_payload_syncs_to_nothing() {
        let mut registry = ModelRegistry::new();
        for form_type in FormType::ALL {
            let out = registry
                .get_mut(form_type)
                .sync_from("a", FormArgs::Locked)
                .expect("locked sync");
            assert!(out.is_none(), "{form_type} returned a form for a locked payload");
        }
    }

    #[test]
    fn forget_missing_drops_only_replaced_steps() {
        let mut registry = ModelRegistry::new();
        registry
            .set_form("a", FormArgs::Sample(SampleFormArgs { rlines: 1 }))
            .expect("set");
        registry
            .set_form("b", FormArgs::Sample(SampleFormArgs { rlines: 2 }))
            .expect("set");
        let previous = vec!["a".to_string(), "b".to_string()];
        let now = vec![OperationRecord::new(FormType::Sample, "b")];

        assert_eq!(registry.forget_missing(&previous, &now), 1);
        assert!(!registry.has_form("a"));
        assert!(registry.has_form("b"));
    }

    #[test]
    fn rekey_moves_draft_state() {
        let mut registry = ModelRegistry::new();
        registry
            .set_form("__new__", FormArgs::Sample(SampleFormArgs { rlines: 7 }))
            .expect("set");
        registry.rekey("__new__", "abc");
        assert!(registry.sample.form("__new__").is_none());
        assert_eq!(
            registry.sample.form("abc"),
            Some(FormArgs::Sample(SampleFormArgs { rlines: 7 }))
        );
    }
}
