//! Operation records and the concordance responses that produce them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    engine::ReplayError,
    types::{ConcId, FormType, NEW_OP_KEY},
};

/// Immutable descriptor of one step in the query history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Step kind.
    pub form_type: FormType,
    /// Persistence id of the state after this step.
    #[serde(rename = "conc_persistence_op_id")]
    pub persistence_id: ConcId,
    /// Display label.
    #[serde(default)]
    pub op: String,
    /// Short operation code, used verbatim when replaying locked steps.
    #[serde(default)]
    pub opid: String,
    /// Human-readable arguments.
    #[serde(default)]
    pub nicearg: String,
    /// Raw operation arguments appended to `opid` for locked steps.
    #[serde(default)]
    pub args: String,
    /// Result size after this step.
    #[serde(default)]
    pub size: Option<u64>,
    /// Full (unsampled) result size after this step.
    #[serde(default, rename = "fullsize")]
    pub full_size: Option<u64>,
    /// Ownership normalized across collaborating sessions.
    #[serde(default)]
    pub is_registered_author: bool,
}

impl OperationRecord {
    /// Creates a record with empty display metadata.
    pub fn new(form_type: FormType, persistence_id: impl Into<ConcId>) -> Self {
        Self {
            form_type,
            persistence_id: persistence_id.into(),
            op: String::new(),
            opid: String::new(),
            nicearg: String::new(),
            args: String::new(),
            size: None,
            full_size: None,
            is_registered_author: false,
        }
    }

    /// Placeholder record for a step about to be appended.
    pub fn draft(form_type: FormType) -> Self {
        Self::new(form_type, NEW_OP_KEY)
    }

    /// Returns true for records that have not been persisted yet.
    pub fn is_draft(&self) -> bool {
        self.persistence_id == NEW_OP_KEY
    }

    /// Operation string re-issued for a locked step.
    pub fn locked_op_string(&self) -> String {
        format!("{}{}", self.opid, self.args)
    }

    /// Copy of this record pointing at the state produced by `response`.
    pub fn advanced_by(&self, response: &ConcordanceResponse) -> Self {
        Self {
            persistence_id: response.persistence_id.clone(),
            size: response.concsize,
            full_size: response.fullsize,
            ..self.clone()
        }
    }

    /// Decodes a record, reporting unknown `form_type` values explicitly.
    pub fn from_value(value: Value) -> Result<Self, ReplayError> {
        check_form_type(&value)?;
        serde_json::from_value(value).map_err(|e| ReplayError::Decode(format!("operation record: {e}")))
    }
}

/// Result of a step submitted with `format=json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcordanceResponse {
    /// Persistence id of the new state.
    pub persistence_id: ConcId,
    /// Result size.
    pub concsize: Option<u64>,
    /// Full result size.
    pub fullsize: Option<u64>,
    /// Server-assembled operation list, when the response carries one.
    pub query_overview: Option<Vec<OperationRecord>>,
    /// User-facing messages.
    pub messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawConcordanceResponse {
    conc_persistence_op_id: ConcId,
    #[serde(default)]
    concsize: Option<u64>,
    #[serde(default)]
    fullsize: Option<u64>,
    #[serde(default)]
    query_overview: Option<Vec<Value>>,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

/// Messages arrive either as plain strings or as `[kind, text]` pairs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawMessage {
    Text(String),
    Pair(String, String),
}

impl RawMessage {
    pub(crate) fn into_text(self) -> String {
        match self {
            RawMessage::Text(text) => text,
            RawMessage::Pair(kind, text) => format!("{kind}: {text}"),
        }
    }
}

impl ConcordanceResponse {
    /// Response carrying only a persistence id.
    pub fn new(persistence_id: impl Into<ConcId>) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            concsize: None,
            fullsize: None,
            query_overview: None,
            messages: Vec::new(),
        }
    }

    /// Decodes a transport payload.
    pub fn from_value(value: Value) -> Result<Self, ReplayError> {
        let raw: RawConcordanceResponse = serde_json::from_value(value)
            .map_err(|e| ReplayError::Decode(format!("concordance response: {e}")))?;
        let query_overview = match raw.query_overview {
            Some(items) if !items.is_empty() => Some(
                items
                    .into_iter()
                    .map(OperationRecord::from_value)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => None,
        };
        Ok(Self {
            persistence_id: raw.conc_persistence_op_id,
            concsize: raw.concsize,
            fullsize: raw.fullsize,
            query_overview,
            messages: raw.messages.into_iter().map(RawMessage::into_text).collect(),
        })
    }
}

/// Reads `form_type` and maps unknown values to `UnsupportedOperationType`.
pub(crate) fn check_form_type(value: &Value) -> Result<FormType, ReplayError> {
    let tag = value
        .get("form_type")
        .and_then(Value::as_str)
        .ok_or_else(|| ReplayError::Decode("missing form_type".to_string()))?;
    tag.parse::<FormType>()
        .map_err(ReplayError::UnsupportedOperationType)
}
