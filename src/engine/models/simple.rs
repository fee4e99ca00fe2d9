//! Sample, main-corpus switch and first-hits forms.

use async_trait::async_trait;

use crate::{
    engine::{
        traits::{OperationModel, StepOutcome, SubmitContext},
        ReplayError,
    },
    form::{FirstHitsFormArgs, FormArgs, SampleFormArgs, SwitchMainCorpusArgs},
    types::FormType,
};

use super::{mismatch, FormStates};

#[derive(Debug, Default)]
pub struct SampleModel {
    forms: FormStates<SampleFormArgs>,
}

#[async_trait]
impl OperationModel for SampleModel {
    fn form_type(&self) -> FormType {
        FormType::Sample
    }

    fn sync_from(&mut self, op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::Sample(form) => {
                self.forms.set(op_key, form.clone());
                Ok(Some(FormArgs::Sample(form)))
            }
            FormArgs::Locked => Ok(None),
            other => Err(mismatch(FormType::Sample, &other)),
        }
    }

    fn form(&self, op_key: &str) -> Option<FormArgs> {
        self.forms.get(op_key).ok().cloned().map(FormArgs::Sample)
    }

    fn forget(&mut self, op_key: &str) {
        self.forms.remove(op_key);
    }

    fn rekey(&mut self, from: &str, to: &str) {
        self.forms.rekey(from, to);
    }

    async fn submit(&self, op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        let rlines = self.forms.get(op_key)?.rlines;
        let next = ctx.concordance.clone();
        ctx.get_concordance("reduce", &[("rlines", rlines.to_string())], next)
            .await
    }
}

#[derive(Debug, Default)]
pub struct SwitchMainCorpusModel {
    forms: FormStates<SwitchMainCorpusArgs>,
}

#[async_trait]
impl OperationModel for SwitchMainCorpusModel {
    fn form_type(&self) -> FormType {
        FormType::SwitchMainCorpus
    }

    fn sync_from(&mut self, op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::SwitchMainCorpus(form) => {
                self.forms.set(op_key, form.clone());
                Ok(Some(FormArgs::SwitchMainCorpus(form)))
            }
            FormArgs::Locked => Ok(None),
            other => Err(mismatch(FormType::SwitchMainCorpus, &other)),
        }
    }

    fn form(&self, op_key: &str) -> Option<FormArgs> {
        self.forms
            .get(op_key)
            .ok()
            .cloned()
            .map(FormArgs::SwitchMainCorpus)
    }

    fn forget(&mut self, op_key: &str) {
        self.forms.remove(op_key);
    }

    fn rekey(&mut self, from: &str, to: &str) {
        self.forms.rekey(from, to);
    }

    async fn submit(&self, op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        let form = self.forms.get(op_key)?.clone();
        let mut next = ctx.concordance.clone();
        next.maincorp = Some(form.maincorp.clone());
        let body = FormArgs::SwitchMainCorpus(form).to_body()?;
        ctx.post_concordance("switch_main_corp", body, next).await
    }
}

#[derive(Debug, Default)]
pub struct FirstHitsModel {
    forms: FormStates<FirstHitsFormArgs>,
}

#[async_trait]
impl OperationModel for FirstHitsModel {
    fn form_type(&self) -> FormType {
        FormType::FirstHits
    }

    fn sync_from(&mut self, op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::FirstHits(form) => {
                self.forms.set(op_key, form.clone());
                Ok(Some(FormArgs::FirstHits(form)))
            }
            FormArgs::Locked => Ok(None),
            other => Err(mismatch(FormType::FirstHits, &other)),
        }
    }

    fn form(&self, op_key: &str) -> Option<FormArgs> {
        self.forms.get(op_key).ok().cloned().map(FormArgs::FirstHits)
    }

    fn forget(&mut self, op_key: &str) {
        self.forms.remove(op_key);
    }

    fn rekey(&mut self, from: &str, to: &str) {
        self.forms.rekey(from, to);
    }

    async fn submit(&self, op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        let doc_struct = self.forms.get(op_key)?.doc_struct.clone();
        let next = ctx.concordance.clone();
        ctx.get_concordance("filter_firsthits", &[("fh_struct", doc_struct)], next)
            .await
    }
}
