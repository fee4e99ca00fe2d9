//! Re-executes a pipeline from an edited step.
//!
//! Given `changed_op_idx = K`, steps `0..K` are left untouched and steps
//! `K..=N` are submitted strictly in order, each against the persistence id
//! produced by the previous one. Form state for every step except `K` is
//! re-synced from the cache (or fetched) first; step `K` keeps whatever the
//! user edited into its sub-model.

use tracing::{debug, info, warn};

use crate::{
    context::ConcordanceContext,
    core::pipeline::PipelineSnapshot,
    form::FormArgs,
    op::OperationRecord,
    transport::{Transport, UrlBuilder},
    types::FormType,
};

use super::{
    loader::{LoadedPipeline, PipelineLoader},
    models::ModelRegistry,
    traits::{StepOutcome, SubmitContext},
    CompletedStep, ReplayError, ReplayFailure,
};

/// Which step changed and how far to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayRequest {
    pub changed_op_idx: usize,
    pub stop_after_op_idx: Option<usize>,
}

impl ReplayRequest {
    pub fn through_tail(changed_op_idx: usize) -> Self {
        Self {
            changed_op_idx,
            stop_after_op_idx: None,
        }
    }

    pub fn stop_after(changed_op_idx: usize, stop_after_op_idx: usize) -> Self {
        Self {
            changed_op_idx,
            stop_after_op_idx: Some(stop_after_op_idx),
        }
    }
}

/// Final effect of a successful replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The chain produced a new tail; announce it and show `view_url`.
    Appended {
        operations: Vec<OperationRecord>,
        context: ConcordanceContext,
        view_url: String,
        messages: Vec<String>,
    },
    /// A terminal URL-based step navigated directly.
    Navigated { url: String },
}

/// Outcome plus a trace of what the executor did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub outcome: ReplayOutcome,
    /// The operation list came from `load_query_pipeline` instead of the cache.
    pub loaded_from_network: bool,
    /// Indices whose sub-model was re-synced, in order.
    pub synced: Vec<usize>,
    pub completed: Vec<CompletedStep>,
}

pub struct ReplayExecutor<'a> {
    transport: &'a dyn Transport,
    urls: &'a UrlBuilder,
}

impl<'a> ReplayExecutor<'a> {
    pub fn new(transport: &'a dyn Transport, urls: &'a UrlBuilder) -> Self {
        Self { transport, urls }
    }

    pub async fn run(
        &self,
        request: ReplayRequest,
        snapshot: &mut PipelineSnapshot,
        models: &mut ModelRegistry,
        context: &ConcordanceContext,
    ) -> Result<ReplayReport, ReplayFailure> {
        let tail = snapshot
            .tail_id()
            .ok_or(ReplayError::EmptyPipeline)?
            .to_string();
        let len = snapshot.len();
        let changed = request.changed_op_idx;
        if changed >= len {
            return Err(ReplayError::IndexOutOfRange { idx: changed, len }.into());
        }
        let last = match request.stop_after_op_idx {
            Some(stop) if stop >= len || stop < changed => {
                return Err(ReplayError::IndexOutOfRange { idx: stop, len }.into());
            }
            Some(stop) => stop,
            None => len - 1,
        };

        let loader = PipelineLoader::new(self.transport, self.urls);
        let (operations, loaded_from_network, mut messages) =
            match LoadedPipeline::from_cache(&snapshot.operations, &snapshot.forms_cache) {
                Some(loaded) => {
                    debug!(tail = %tail, "pipeline resolved from cache");
                    (loaded.operations, false, Vec::new())
                }
                None => {
                    let loaded = loader.load_full(&context.corpname, &tail).await?;
                    snapshot.forms_cache.absorb(loaded.form_args);
                    (loaded.operations, true, loaded.messages)
                }
            };
        if operations.len() != len {
            warn!(
                local = len,
                server = operations.len(),
                "server pipeline length differs from local snapshot"
            );
        }
        if last >= operations.len() {
            return Err(ReplayError::IndexOutOfRange {
                idx: last,
                len: operations.len(),
            }
            .into());
        }

        info!(
            changed_op_idx = changed,
            last_op_idx = last,
            loaded_from_network,
            "replaying pipeline"
        );

        let mut running = match changed {
            0 => context.clone().without_persistence_id(),
            k => context
                .clone()
                .with_persistence_id(operations[k - 1].persistence_id.clone()),
        };
        let mut synced = Vec::new();
        let mut completed: Vec<CompletedStep> = Vec::new();

        for (idx, op) in operations.iter().enumerate().take(last + 1).skip(changed) {
            let is_last = idx == last;
            let fail = |completed: &Vec<CompletedStep>, error: ReplayError| ReplayFailure {
                failed_at: Some(idx),
                completed: completed.clone(),
                error,
            };

            let mut handler = op.form_type;
            if idx == changed {
                // The edited step is never re-synced, but a locked one is still
                // re-issued verbatim.
                if snapshot.forms_cache.get(&op.persistence_id) == Some(&FormArgs::Locked) {
                    handler = FormType::Locked;
                }
            } else {
                let args = match snapshot.forms_cache.get(&op.persistence_id) {
                    Some(args) => args.clone(),
                    None => {
                        let args = loader
                            .fetch_form_args(&context.corpname, &tail, idx)
                            .await
                            .map_err(|e| fail(&completed, e))?;
                        snapshot
                            .forms_cache
                            .put(op.persistence_id.clone(), args.clone());
                        args
                    }
                };
                let is_locked_payload = args == FormArgs::Locked;
                models
                    .get_mut(op.form_type)
                    .sync_from(&op.persistence_id, args)
                    .map_err(|e| fail(&completed, e))?;
                synced.push(idx);
                if is_locked_payload {
                    handler = FormType::Locked;
                }
            }

            debug!(
                idx,
                form_type = %handler,
                base = running.persistence_id.as_deref().unwrap_or(""),
                is_last,
                "submitting step"
            );
            let ctx = SubmitContext {
                transport: self.transport,
                urls: self.urls,
                concordance: running.clone(),
                op,
                position: idx,
                is_last,
                disable_default_shuffle: idx == 0 && !is_last,
            };
            let outcome = models
                .get(handler)
                .submit(&op.persistence_id, ctx)
                .await
                .map_err(|e| fail(&completed, e))?;

            match outcome {
                StepOutcome::Concordance {
                    response,
                    context: next,
                } => {
                    messages.extend(response.messages.iter().cloned());
                    completed.push(CompletedStep { idx, response });
                    running = next;
                }
                StepOutcome::Navigate { url } => {
                    info!(idx, url = %url, "replay ended with navigation");
                    return Ok(ReplayReport {
                        outcome: ReplayOutcome::Navigated { url },
                        loaded_from_network,
                        synced,
                        completed,
                    });
                }
            }
        }

        let new_operations = rebuild_operations(&operations, changed, &completed);
        snapshot.apply_replay(new_operations.clone());
        let view_url = self.urls.create_action_url("view", &running.to_args());
        info!(
            tail = running.persistence_id.as_deref().unwrap_or(""),
            steps = completed.len(),
            "replay finished"
        );

        Ok(ReplayReport {
            outcome: ReplayOutcome::Appended {
                operations: new_operations,
                context: running,
                view_url,
                messages,
            },
            loaded_from_network,
            synced,
            completed,
        })
    }
}

/// Steps before `changed` stay; replayed steps take their new ids and sizes.
/// A server-provided overview on the final response wins.
fn rebuild_operations(
    operations: &[OperationRecord],
    changed: usize,
    completed: &[CompletedStep],
) -> Vec<OperationRecord> {
    if let Some(overview) = completed
        .last()
        .and_then(|step| step.response.query_overview.as_ref())
    {
        return overview.clone();
    }
    let mut out: Vec<OperationRecord> = operations[..changed].to_vec();
    for step in completed {
        out.push(operations[step.idx].advanced_by(&step.response));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::ConcordanceResponse;

    #[test]
    fn rebuild_keeps_prefix_and_advances_replayed_steps() {
        let ops = vec![
            OperationRecord::new(FormType::Query, "a"),
            OperationRecord::new(FormType::Filter, "b"),
            OperationRecord::new(FormType::Sort, "c"),
        ];
        let mut resp_b = ConcordanceResponse::new("b2");
        resp_b.concsize = Some(10);
        let completed = vec![
            CompletedStep {
                idx: 1,
                response: resp_b,
            },
            CompletedStep {
                idx: 2,
                response: ConcordanceResponse::new("c2"),
            },
        ];
        let rebuilt = rebuild_operations(&ops, 1, &completed);
        let ids: Vec<&str> = rebuilt.iter().map(|op| op.persistence_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b2", "c2"]);
        assert_eq!(rebuilt[1].size, Some(10));
        assert_eq!(rebuilt[2].form_type, FormType::Sort);
    }

    #[test]
    fn rebuild_prefers_server_overview() {
        let ops = vec![OperationRecord::new(FormType::Query, "a")];
        let mut resp = ConcordanceResponse::new("z");
        resp.query_overview = Some(vec![OperationRecord::new(FormType::Query, "z")]);
        let rebuilt = rebuild_operations(&ops, 0, &[CompletedStep { idx: 0, response: resp }]);
        assert_eq!(rebuilt, vec![OperationRecord::new(FormType::Query, "z")]);
    }
}
