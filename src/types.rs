//! Shared primitive ids and the closed set of operation types.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Server-assigned persistence id of a stored concordance state.
pub type ConcId = String;
/// Monotonic replay request identifier.
pub type RequestId = u64;

/// Cache and sub-model key of a draft operation that has no persistence id yet.
pub const NEW_OP_KEY: &str = "__new__";

/// Kind of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormType {
    /// Initial query.
    #[serde(rename = "query")]
    Query,
    /// Positive or negative filter.
    #[serde(rename = "filter")]
    Filter,
    /// Single- or multi-level sort.
    #[serde(rename = "sort")]
    Sort,
    /// Random sample.
    #[serde(rename = "sample")]
    Sample,
    /// Random shuffle of lines.
    #[serde(rename = "shuffle")]
    Shuffle,
    /// Switch of the primary corpus in an aligned query.
    #[serde(rename = "switchmc")]
    SwitchMainCorpus,
    /// Removal of nested hits.
    #[serde(rename = "subhits")]
    Subhits,
    /// First hit per document structure.
    #[serde(rename = "firsthits")]
    FirstHits,
    /// Step owned by another session; replayable only verbatim.
    #[serde(rename = "locked")]
    Locked,
}

impl FormType {
    /// Every operation type, in declaration order.
    pub const ALL: [FormType; 9] = [
        FormType::Query,
        FormType::Filter,
        FormType::Sort,
        FormType::Sample,
        FormType::Shuffle,
        FormType::SwitchMainCorpus,
        FormType::Subhits,
        FormType::FirstHits,
        FormType::Locked,
    ];

    /// Wire name used in `form_type` fields.
    pub fn as_str(self) -> &'static str {
        match self {
            FormType::Query => "query",
            FormType::Filter => "filter",
            FormType::Sort => "sort",
            FormType::Sample => "sample",
            FormType::Shuffle => "shuffle",
            FormType::SwitchMainCorpus => "switchmc",
            FormType::Subhits => "subhits",
            FormType::FirstHits => "firsthits",
            FormType::Locked => "locked",
        }
    }

    /// True for steps executed by URL construction instead of a form submit.
    pub fn is_url_based(self) -> bool {
        matches!(self, FormType::Shuffle | FormType::Subhits | FormType::Locked)
    }

    /// True when the step carries a user-editable form.
    pub fn has_form(self) -> bool {
        !self.is_url_based()
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormType::ALL
            .into_iter()
            .find(|ft| ft.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}
