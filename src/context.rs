//! Explicit "current concordance arguments", threaded through every submit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::ConcId;

/// Arguments identifying the concordance a step runs against.
///
/// Sub-models never mutate a shared copy; each submit receives one and returns
/// the updated value in its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConcordanceContext {
    /// Primary corpus.
    pub corpname: String,
    /// Corpus whose KWIC is primary in an aligned query.
    #[serde(default)]
    pub maincorp: Option<String>,
    /// Subcorpus.
    #[serde(default)]
    pub usesubcorp: Option<String>,
    /// KWIC or sentence view.
    #[serde(default)]
    pub viewmode: Option<String>,
    /// Lines per page.
    #[serde(default)]
    pub pagesize: Option<u32>,
    /// Persistence id of the current state; rendered as `q=~<id>`.
    #[serde(default)]
    pub persistence_id: Option<ConcId>,
    /// Additional pass-through arguments.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ConcordanceContext {
    pub fn new(corpname: impl Into<String>) -> Self {
        Self {
            corpname: corpname.into(),
            ..Self::default()
        }
    }

    /// `~<persistence id>` when a state exists.
    pub fn q(&self) -> Option<String> {
        self.persistence_id.as_ref().map(|id| format!("~{id}"))
    }

    pub fn with_persistence_id(mut self, id: impl Into<ConcId>) -> Self {
        self.persistence_id = Some(id.into());
        self
    }

    pub fn without_persistence_id(mut self) -> Self {
        self.persistence_id = None;
        self
    }

    /// Query-string arguments in a stable order, `q` last.
    pub fn to_args(&self) -> Vec<(String, String)> {
        let mut args = vec![("corpname".to_string(), self.corpname.clone())];
        if let Some(v) = &self.maincorp {
            args.push(("maincorp".to_string(), v.clone()));
        }
        if let Some(v) = &self.usesubcorp {
            args.push(("usesubcorp".to_string(), v.clone()));
        }
        if let Some(v) = &self.viewmode {
            args.push(("viewmode".to_string(), v.clone()));
        }
        if let Some(v) = self.pagesize {
            args.push(("pagesize".to_string(), v.to_string()));
        }
        for (k, v) in &self.extra {
            args.push((k.clone(), v.clone()));
        }
        if let Some(q) = self.q() {
            args.push(("q".to_string(), q));
        }
        args
    }
}
