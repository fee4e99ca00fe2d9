use async_trait::async_trait;

use crate::{
    engine::{
        traits::{OperationModel, StepOutcome, SubmitContext},
        ReplayError,
    },
    form::{FilterFormArgs, FormArgs},
    types::FormType,
};

use super::{mismatch, FormStates};

#[derive(Debug, Default)]
pub struct FilterModel {
    forms: FormStates<FilterFormArgs>,
}

#[async_trait]
impl OperationModel for FilterModel {
    fn form_type(&self) -> FormType {
        FormType::Filter
    }

    fn sync_from(&mut self, op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::Filter(form) => {
                self.forms.set(op_key, form.clone());
                Ok(Some(FormArgs::Filter(form)))
            }
            FormArgs::Locked => Ok(None),
            other => Err(mismatch(FormType::Filter, &other)),
        }
    }

    fn form(&self, op_key: &str) -> Option<FormArgs> {
        self.forms.get(op_key).ok().cloned().map(FormArgs::Filter)
    }

    fn forget(&mut self, op_key: &str) {
        self.forms.remove(op_key);
    }

    fn rekey(&mut self, from: &str, to: &str) {
        self.forms.rekey(from, to);
    }

    async fn submit(&self, op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        let form = self.forms.get(op_key)?.clone();
        let next = ctx.concordance.clone();
        let body = FormArgs::Filter(form).to_body()?;
        ctx.post_concordance("filter", body, next).await
    }
}
