use hashbrown::HashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    core::cache::FormArgsCache,
    form::FormArgs,
    op::{OperationRecord, RawMessage},
    transport::{HttpRequest, Transport, UrlBuilder},
    types::ConcId,
};

use super::ReplayError;

/// Operation list of a pipeline together with every step's form args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPipeline {
    pub operations: Vec<OperationRecord>,
    pub form_args: HashMap<ConcId, FormArgs>,
    pub messages: Vec<String>,
}

impl LoadedPipeline {
    /// Assembles the pipeline from the cache alone; `None` when any entry is missing.
    pub fn from_cache(operations: &[OperationRecord], cache: &FormArgsCache) -> Option<Self> {
        let mut form_args = HashMap::with_capacity(operations.len());
        for op in operations {
            let args = cache.get(&op.persistence_id)?;
            form_args.insert(op.persistence_id.clone(), args.clone());
        }
        Some(Self {
            operations: operations.to_vec(),
            form_args,
            messages: Vec::new(),
        })
    }

    /// Cache built from the loaded args; replaces the previous one wholesale.
    pub fn to_cache(&self) -> FormArgsCache {
        let mut cache = FormArgsCache::new();
        cache.absorb(self.form_args.iter().map(|(k, v)| (k.clone(), v.clone())));
        cache
    }

    pub fn tail_id(&self) -> Option<&str> {
        self.operations.last().map(|op| op.persistence_id.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawPipelineOp {
    id: ConcId,
    #[serde(default)]
    form_args: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPipelineResponse {
    ops: Vec<RawPipelineOp>,
    query_overview: Vec<Value>,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

/// Resolves operation lists and form args from the server.
pub struct PipelineLoader<'a> {
    transport: &'a dyn Transport,
    urls: &'a UrlBuilder,
}

impl<'a> PipelineLoader<'a> {
    pub fn new(transport: &'a dyn Transport, urls: &'a UrlBuilder) -> Self {
        Self { transport, urls }
    }

    /// Loads the full pipeline ending at `tail` with one `load_query_pipeline` call.
    pub async fn load_full(&self, corpname: &str, tail: &str) -> Result<LoadedPipeline, ReplayError> {
        let url = self.urls.create_action_url(
            "load_query_pipeline",
            &[
                ("corpname".to_string(), corpname.to_string()),
                ("q".to_string(), format!("~{tail}")),
                ("format".to_string(), "json".to_string()),
            ],
        );
        debug!(tail, "loading query pipeline");
        let value = self.transport.send(HttpRequest::get(url)).await?;
        decode_pipeline(value)
    }

    /// Fetches the form args of operation `idx` within the pipeline ending at `last_key`.
    pub async fn fetch_form_args(
        &self,
        corpname: &str,
        last_key: &str,
        idx: usize,
    ) -> Result<FormArgs, ReplayError> {
        let url = self.urls.create_action_url(
            "ajax_fetch_conc_form_args",
            &[
                ("corpname".to_string(), corpname.to_string()),
                ("last_key".to_string(), last_key.to_string()),
                ("idx".to_string(), idx.to_string()),
            ],
        );
        debug!(last_key, idx, "fetching form args");
        let value = self.transport.send(HttpRequest::get(url)).await?;
        FormArgs::from_value(value)
    }
}

/// `ops[i].id` is authoritative for `query_overview[i]`.
fn decode_pipeline(value: Value) -> Result<LoadedPipeline, ReplayError> {
    let raw: RawPipelineResponse = serde_json::from_value(value)
        .map_err(|e| ReplayError::Decode(format!("pipeline response: {e}")))?;
    if raw.ops.len() != raw.query_overview.len() {
        return Err(ReplayError::Decode(format!(
            "pipeline has {} ops but {} overview entries",
            raw.ops.len(),
            raw.query_overview.len()
        )));
    }

    let mut operations = Vec::with_capacity(raw.ops.len());
    let mut form_args = HashMap::with_capacity(raw.ops.len());
    for (op, overview) in raw.ops.into_iter().zip(raw.query_overview) {
        let mut record = OperationRecord::from_value(overview)?;
        record.persistence_id = op.id.clone();
        if let Some(args) = op.form_args {
            form_args.insert(op.id, FormArgs::from_value(args)?);
        }
        operations.push(record);
    }

    Ok(LoadedPipeline {
        operations,
        form_args,
        messages: raw.messages.into_iter().map(RawMessage::into_text).collect(),
    })
}
