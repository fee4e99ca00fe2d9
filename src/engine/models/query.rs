use async_trait::async_trait;
use tracing::debug;

use crate::{
    engine::{
        traits::{OperationModel, StepOutcome, SubmitContext},
        ReplayError,
    },
    form::{FormArgs, QueryFormArgs},
    transport::HttpRequest,
    types::FormType,
};

use super::{mismatch, FormStates};

/// Initial query form.
#[derive(Debug, Default)]
pub struct QueryModel {
    forms: FormStates<QueryFormArgs>,
}

impl QueryModel {
    pub fn query_form(&self, op_key: &str) -> Option<&QueryFormArgs> {
        self.forms.get(op_key).ok()
    }
}

#[async_trait]
impl OperationModel for QueryModel {
    fn form_type(&self) -> FormType {
        FormType::Query
    }

    fn sync_from(&mut self, op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::Query(form) => {
                self.forms.set(op_key, form.clone());
                Ok(Some(FormArgs::Query(form)))
            }
            FormArgs::Locked => Ok(None),
            other => Err(mismatch(FormType::Query, &other)),
        }
    }

    fn form(&self, op_key: &str) -> Option<FormArgs> {
        self.forms.get(op_key).ok().cloned().map(FormArgs::Query)
    }

    fn forget(&mut self, op_key: &str) {
        self.forms.remove(op_key);
    }

    fn rekey(&mut self, from: &str, to: &str) {
        self.forms.rekey(from, to);
    }

    async fn submit(&self, op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        let mut form = self.forms.get(op_key)?.clone();
        if ctx.disable_default_shuffle && form.shuffle {
            debug!(op_key, "default shuffle disabled, later steps follow");
            form.shuffle = false;
        }

        // A query starts a new concordance: no base id, corpus args from the form.
        let mut next = ctx.concordance.clone().without_persistence_id();
        next.corpname = form.corpname.clone();
        next.maincorp = form.maincorp.clone();
        next.usesubcorp = form.usesubcorp.clone();

        let url = ctx.urls.create_action_url(
            "query_submit",
            &[("format".to_string(), "json".to_string())],
        );
        let body = FormArgs::Query(form).to_body()?;
        ctx.fetch_concordance(HttpRequest::post(url, body), next).await
    }
}
