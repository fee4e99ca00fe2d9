//! Per-type form arguments, the values stored in the form-args cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{engine::ReplayError, op::check_form_type, types::FormType};

/// Query language of a query or filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QueryType {
    /// Plain word query.
    #[default]
    #[serde(rename = "simple")]
    Simple,
    /// CQL query.
    #[serde(rename = "advanced")]
    Advanced,
}

/// One (possibly aligned) corpus query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Corpus the query runs against.
    pub corpname: String,
    /// Query language.
    #[serde(default)]
    pub qtype: QueryType,
    /// Query text; opaque to this crate.
    pub query: String,
    /// Default attribute for simple queries.
    #[serde(default)]
    pub default_attr: Option<String>,
    /// Positive/negative alignment constraint for aligned corpora.
    #[serde(default)]
    pub pcq_pos_neg: Option<String>,
    /// Keep empty alignments.
    #[serde(default)]
    pub include_empty: bool,
}

/// Arguments of the initial query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFormArgs {
    /// Primary corpus.
    pub corpname: String,
    /// Subcorpus, if any.
    #[serde(default)]
    pub usesubcorp: Option<String>,
    /// Corpus whose KWIC is primary in an aligned query.
    #[serde(default)]
    pub maincorp: Option<String>,
    /// Queries, primary first.
    pub queries: Vec<QuerySpec>,
    /// Text type restrictions (structural attribute -> allowed values).
    #[serde(default)]
    pub text_types: BTreeMap<String, Vec<String>>,
    /// Apply the default shuffle after the query.
    #[serde(default)]
    pub shuffle: bool,
}

/// Keep or drop matching lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FilterPolarity {
    /// Keep lines that match.
    #[default]
    #[serde(rename = "p")]
    Positive,
    /// Drop lines that match.
    #[serde(rename = "n")]
    Negative,
}

/// Arguments of a filter step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterFormArgs {
    /// Corpus the filter query is evaluated in.
    #[serde(default)]
    pub maincorp: Option<String>,
    /// Query language of the filter.
    #[serde(default)]
    pub query_type: QueryType,
    /// Filter query text.
    pub query: String,
    /// Default attribute for simple queries.
    #[serde(default)]
    pub default_attr: Option<String>,
    /// Polarity.
    #[serde(default)]
    pub pnfilter: FilterPolarity,
    /// Match the first or last token of the range (`f` / `l`).
    #[serde(default = "default_filfl")]
    pub filfl: String,
    /// Range start relative to the KWIC.
    #[serde(default)]
    pub filfpos: String,
    /// Range end relative to the KWIC.
    #[serde(default)]
    pub filtpos: String,
    /// Include the KWIC itself in the range.
    #[serde(default)]
    pub inclkwic: bool,
    /// Evaluate as a `within` constraint.
    #[serde(default)]
    pub within: bool,
}

fn default_filfl() -> String {
    "f".to_string()
}

/// Server action used by a sort step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortAction {
    /// Single-level sort.
    #[default]
    #[serde(rename = "sortx")]
    Sortx,
    /// Multi-level sort.
    #[serde(rename = "mlsortx")]
    Mlsortx,
}

impl SortAction {
    /// Action path on the server.
    pub fn as_str(self) -> &'static str {
        match self {
            SortAction::Sortx => "sortx",
            SortAction::Mlsortx => "mlsortx",
        }
    }
}

/// Wire arguments of a sort step; `form_action` selects which field group applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SortFormArgs {
    /// Single- or multi-level.
    #[serde(default)]
    pub form_action: SortAction,
    /// Single-level sort attribute.
    #[serde(default)]
    pub sattr: String,
    /// Single-level sort context (`lc`, `kw`, `rc`).
    #[serde(default)]
    pub skey: String,
    /// Single-level number of tokens.
    #[serde(default)]
    pub spos: u32,
    /// Single-level case folding.
    #[serde(default)]
    pub sicase: bool,
    /// Single-level backward sort.
    #[serde(default)]
    pub sbward: bool,
    /// Number of active multi-level sort levels.
    #[serde(default)]
    pub sortlevel: u32,
    /// Multi-level attributes.
    #[serde(default)]
    pub mlxattr: Vec<String>,
    /// Multi-level context positions.
    #[serde(default)]
    pub mlxctx: Vec<String>,
    /// Multi-level token counts.
    #[serde(default)]
    pub mlxpos: Vec<u32>,
    /// Multi-level case folding.
    #[serde(default)]
    pub mlxicase: Vec<bool>,
    /// Multi-level backward sort.
    #[serde(default)]
    pub mlxbward: Vec<bool>,
}

/// Arguments of a sample step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFormArgs {
    /// Number of lines kept.
    pub rlines: u64,
}

/// Arguments of a main-corpus switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchMainCorpusArgs {
    /// Aligned corpus that becomes primary.
    pub maincorp: String,
}

/// Arguments of a first-hits filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstHitsFormArgs {
    /// Structure whose first hit is kept (e.g. `doc`).
    pub doc_struct: String,
}

/// Exact arguments that resubmit one step, tagged by `form_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form_type")]
pub enum FormArgs {
    /// Initial query.
    #[serde(rename = "query")]
    Query(QueryFormArgs),
    /// Filter.
    #[serde(rename = "filter")]
    Filter(FilterFormArgs),
    /// Sort.
    #[serde(rename = "sort")]
    Sort(SortFormArgs),
    /// Sample.
    #[serde(rename = "sample")]
    Sample(SampleFormArgs),
    /// Shuffle; no arguments.
    #[serde(rename = "shuffle")]
    Shuffle,
    /// Main-corpus switch.
    #[serde(rename = "switchmc")]
    SwitchMainCorpus(SwitchMainCorpusArgs),
    /// Subhits removal; no arguments.
    #[serde(rename = "subhits")]
    Subhits,
    /// First hits.
    #[serde(rename = "firsthits")]
    FirstHits(FirstHitsFormArgs),
    /// Form data owned by another session.
    #[serde(rename = "locked")]
    Locked,
}

impl FormArgs {
    /// Type tag of this payload.
    pub fn form_type(&self) -> FormType {
        match self {
            FormArgs::Query(_) => FormType::Query,
            FormArgs::Filter(_) => FormType::Filter,
            FormArgs::Sort(_) => FormType::Sort,
            FormArgs::Sample(_) => FormType::Sample,
            FormArgs::Shuffle => FormType::Shuffle,
            FormArgs::SwitchMainCorpus(_) => FormType::SwitchMainCorpus,
            FormArgs::Subhits => FormType::Subhits,
            FormArgs::FirstHits(_) => FormType::FirstHits,
            FormArgs::Locked => FormType::Locked,
        }
    }

    /// Decodes a server payload; unknown `form_type` values are `UnsupportedOperationType`.
    pub fn from_value(value: Value) -> Result<Self, ReplayError> {
        check_form_type(&value)?;
        serde_json::from_value(value).map_err(|e| ReplayError::Decode(format!("form args: {e}")))
    }

    /// Serializes the payload without its type tag, as sent to submit endpoints.
    pub fn to_body(&self) -> Result<Value, ReplayError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| ReplayError::Decode(format!("form args body: {e}")))?;
        if let Value::Object(map) = &mut value {
            map.remove("form_type");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unit_variants_ignore_extra_fields() {
        let args = FormArgs::from_value(json!({"form_type": "shuffle", "messages": []})).expect("decode");
        assert_eq!(args, FormArgs::Shuffle);
    }

    #[test]
    fn sort_payload_defaults_to_single_level() {
        let args = FormArgs::from_value(json!({
            "form_type": "sort",
            "sattr": "word",
            "skey": "rc",
            "spos": 3,
        }))
        .expect("decode");
        let FormArgs::Sort(sort) = args else {
            panic!("expected sort args");
        };
        assert_eq!(sort.form_action, SortAction::Sortx);
        assert_eq!(sort.spos, 3);
        assert!(sort.mlxattr.is_empty());
    }

    #[test]
    fn body_drops_type_tag() {
        let args = FormArgs::Sample(SampleFormArgs { rlines: 250 });
        assert_eq!(args.to_body().expect("body"), json!({"rlines": 250}));
    }

    #[test]
    fn missing_tag_is_decode_error() {
        let err = FormArgs::from_value(json!({"rlines": 1})).expect_err("no tag");
        assert!(matches!(err, ReplayError::Decode(_)));
    }
}
