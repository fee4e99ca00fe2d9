//! Form-less steps executed by URL construction: shuffle, subhits, locked.

use async_trait::async_trait;

use crate::{
    engine::{
        traits::{OperationModel, StepOutcome, SubmitContext},
        ReplayError,
    },
    form::FormArgs,
    types::FormType,
};

use super::mismatch;

/// Shuffle or subhits. A terminal step navigates; otherwise the step is
/// fetched with `format=json` so later steps get a persistence id.
#[derive(Debug)]
pub struct UrlOperationModel {
    form_type: FormType,
    action: &'static str,
}

impl UrlOperationModel {
    pub fn shuffle() -> Self {
        Self {
            form_type: FormType::Shuffle,
            action: "shuffle",
        }
    }

    pub fn subhits() -> Self {
        Self {
            form_type: FormType::Subhits,
            action: "filter_subhits",
        }
    }

    fn unit_args(&self) -> FormArgs {
        match self.form_type {
            FormType::Subhits => FormArgs::Subhits,
            _ => FormArgs::Shuffle,
        }
    }
}

#[async_trait]
impl OperationModel for UrlOperationModel {
    fn form_type(&self) -> FormType {
        self.form_type
    }

    fn sync_from(&mut self, _op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::Locked => Ok(None),
            args if args.form_type() == self.form_type => Ok(Some(args)),
            other => Err(mismatch(self.form_type, &other)),
        }
    }

    fn form(&self, _op_key: &str) -> Option<FormArgs> {
        Some(self.unit_args())
    }

    fn forget(&mut self, _op_key: &str) {}

    fn rekey(&mut self, _from: &str, _to: &str) {}

    async fn submit(&self, _op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        if ctx.is_last {
            let url = ctx
                .urls
                .create_action_url(self.action, &ctx.concordance.to_args());
            return Ok(StepOutcome::Navigate { url });
        }
        let next = ctx.concordance.clone();
        ctx.get_concordance(self.action, &[], next).await
    }
}

/// Re-issues a recorded operation verbatim as `q=<opid><args>` on top of the base.
#[derive(Debug, Default)]
pub struct LockedModel;

#[async_trait]
impl OperationModel for LockedModel {
    fn form_type(&self) -> FormType {
        FormType::Locked
    }

    fn sync_from(&mut self, _op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::Locked => Ok(None),
            other => Err(mismatch(FormType::Locked, &other)),
        }
    }

    fn form(&self, _op_key: &str) -> Option<FormArgs> {
        None
    }

    fn forget(&mut self, _op_key: &str) {}

    fn rekey(&mut self, _from: &str, _to: &str) {}

    async fn submit(&self, _op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        // TODO: args are embedded unvalidated; reject control characters once the op grammar is pinned down.
        let op_string = ctx.op.locked_op_string();
        if ctx.is_last {
            let mut args = ctx.concordance.to_args();
            args.push(("q".to_string(), op_string));
            let url = ctx.urls.create_action_url("view", &args);
            return Ok(StepOutcome::Navigate { url });
        }
        let next = ctx.concordance.clone();
        ctx.get_concordance("view", &[("q", op_string)], next).await
    }
}
