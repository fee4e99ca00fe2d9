use async_trait::async_trait;

use crate::{
    context::ConcordanceContext,
    form::FormArgs,
    op::{ConcordanceResponse, OperationRecord},
    transport::{HttpRequest, Transport, UrlBuilder},
    types::FormType,
};

use super::ReplayError;

/// Everything a sub-model needs to execute one step.
pub struct SubmitContext<'a> {
    pub transport: &'a dyn Transport,
    pub urls: &'a UrlBuilder,
    /// Context after the previous step; its persistence id is the base concordance.
    pub concordance: ConcordanceContext,
    /// Record of the step being submitted.
    pub op: &'a OperationRecord,
    /// Index of the step in the pipeline.
    pub position: usize,
    /// Last step of this replay.
    pub is_last: bool,
    /// Suppress the query's default shuffle because later steps exist.
    pub disable_default_shuffle: bool,
}

impl SubmitContext<'_> {
    pub fn base_id(&self) -> Option<&str> {
        self.concordance.persistence_id.as_deref()
    }

    /// Context args, then `extra`, then `format=json`.
    pub fn json_args(&self, extra: &[(&str, String)]) -> Vec<(String, String)> {
        let mut args = self.concordance.to_args();
        args.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));
        args.push(("format".to_string(), "json".to_string()));
        args
    }

    pub async fn get_concordance(
        &self,
        action: &str,
        extra: &[(&str, String)],
        next: ConcordanceContext,
    ) -> Result<StepOutcome, ReplayError> {
        let url = self.urls.create_action_url(action, &self.json_args(extra));
        self.fetch_concordance(HttpRequest::get(url), next).await
    }

    pub async fn post_concordance(
        &self,
        action: &str,
        body: serde_json::Value,
        next: ConcordanceContext,
    ) -> Result<StepOutcome, ReplayError> {
        let url = self.urls.create_action_url(action, &self.json_args(&[]));
        self.fetch_concordance(HttpRequest::post(url, body), next).await
    }

    /// Sends `request`; the response's persistence id becomes `next`'s state.
    pub async fn fetch_concordance(
        &self,
        request: HttpRequest,
        next: ConcordanceContext,
    ) -> Result<StepOutcome, ReplayError> {
        let value = self.transport.send(request).await?;
        let response = ConcordanceResponse::from_value(value)?;
        let context = next.with_persistence_id(response.persistence_id.clone());
        Ok(StepOutcome::Concordance { response, context })
    }
}

/// What a submitted step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A new concordance state to chain from.
    Concordance {
        response: ConcordanceResponse,
        context: ConcordanceContext,
    },
    /// Terminal step resolved to a page navigation.
    Navigate { url: String },
}

/// State owner for one operation type.
///
/// Form state is keyed by operation key: the step's persistence id, or
/// [`crate::types::NEW_OP_KEY`] for a draft.
#[async_trait]
pub trait OperationModel: Send + Sync {
    fn form_type(&self) -> FormType;

    /// Adopts `args` as the editable state of `op_key`. A locked payload
    /// yields `Ok(None)`; a payload of another type is `SyncTypeMismatch`.
    fn sync_from(&mut self, op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError>;

    /// Current editable state of `op_key`.
    fn form(&self, op_key: &str) -> Option<FormArgs>;

    fn forget(&mut self, op_key: &str);

    fn rekey(&mut self, from: &str, to: &str);

    /// Executes the step from the current in-memory state of `op_key`.
    async fn submit(&self, op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError>;
}
