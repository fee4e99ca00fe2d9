use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    context::ConcordanceContext,
    core::pipeline::PipelineSnapshot,
    engine::{
        ReplayError, ReplayFailure,
        loader::PipelineLoader,
        models::{ModelRegistry, SortKind},
        replay::{ReplayExecutor, ReplayOutcome, ReplayReport, ReplayRequest},
        traits::{StepOutcome, SubmitContext},
    },
    form::FormArgs,
    op::OperationRecord,
    persist::{PersistError, SavedPipeline, SnapshotStore, sqlite::now_ms},
    transport::{Transport, UrlBuilder},
    types::{ConcId, FormType, NEW_OP_KEY, RequestId},
};

use super::{
    events::PipelineEvent,
    state::{MenuState, ReplayPolicy, ReplayState},
};

#[derive(Debug)]
pub enum RuntimeError {
    Engine(ReplayError),
    Replay(ReplayFailure),
    Persist(PersistError),
    ChannelClosed,
}

impl From<ReplayError> for RuntimeError {
    fn from(value: ReplayError) -> Self {
        Self::Engine(value)
    }
}

impl From<ReplayFailure> for RuntimeError {
    fn from(value: ReplayFailure) -> Self {
        Self::Replay(value)
    }
}

impl From<PersistError> for RuntimeError {
    fn from(value: PersistError) -> Self {
        Self::Persist(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub replay_policy: ReplayPolicy,
    pub command_capacity: usize,
    pub event_capacity: usize,
    /// Write a snapshot to the store after every append.
    pub persist_on_append: bool,
    /// Snapshots kept after a checkpoint; 0 keeps all.
    pub keep_snapshots: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            replay_policy: ReplayPolicy::Reject,
            command_capacity: 64,
            event_capacity: 256,
            persist_on_append: false,
            keep_snapshots: 16,
        }
    }
}

/// Server root, initial concordance arguments and runtime tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub root_url: String,
    pub context: ConcordanceContext,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl ClientConfig {
    pub fn new(root_url: impl Into<String>, context: ConcordanceContext) -> Self {
        Self {
            root_url: root_url.into(),
            context,
            runtime: RuntimeConfig::default(),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

pub struct PipelineHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<PipelineEvent>,
    state_tx: Arc<watch::Sender<ReplayState>>,
    lock_tx: Arc<watch::Sender<bool>>,
    request_ids: Arc<AtomicU64>,
    policy: ReplayPolicy,
}

impl Clone for PipelineHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
            state_tx: Arc::clone(&self.state_tx),
            lock_tx: Arc::clone(&self.lock_tx),
            request_ids: Arc::clone(&self.request_ids),
            policy: self.policy,
        }
    }
}

enum Command {
    Branch {
        request: ReplayRequest,
        request_id: RequestId,
        resp: oneshot::Sender<Result<ReplayReport, RuntimeError>>,
    },
    EditStep {
        idx: usize,
        resp: oneshot::Sender<Result<Option<FormArgs>, RuntimeError>>,
    },
    UpdateForm {
        idx: usize,
        args: FormArgs,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    SetSortKind {
        idx: usize,
        kind: SortKind,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    TrimAfter {
        idx: usize,
        resp: oneshot::Sender<Result<Vec<OperationRecord>, RuntimeError>>,
    },
    Reload {
        tail: Option<ConcId>,
        resp: oneshot::Sender<Result<usize, RuntimeError>>,
    },
    SubmitNew {
        args: FormArgs,
        resp: oneshot::Sender<Result<Option<OperationRecord>, RuntimeError>>,
    },
    Snapshot {
        resp: oneshot::Sender<PipelineSnapshot>,
    },
    Context {
        resp: oneshot::Sender<ConcordanceContext>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

type SharedStore = Arc<Mutex<Box<dyn SnapshotStore>>>;

struct Actor {
    snapshot: PipelineSnapshot,
    models: ModelRegistry,
    context: ConcordanceContext,
    transport: Arc<dyn Transport>,
    urls: UrlBuilder,
    store: Option<SharedStore>,
    events_tx: broadcast::Sender<PipelineEvent>,
    state_tx: Arc<watch::Sender<ReplayState>>,
    config: RuntimeConfig,
}

pub fn spawn_pipeline_runtime(
    snapshot: PipelineSnapshot,
    client: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Option<Box<dyn SnapshotStore>>,
) -> PipelineHandle {
    let config = client.runtime;
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_capacity.max(1));
    let (events_tx, _) = broadcast::channel::<PipelineEvent>(config.event_capacity.max(1));
    let (state_tx, _) = watch::channel(ReplayState::Idle);
    let state_tx = Arc::new(state_tx);
    let policy = config.replay_policy;

    let mut context = client.context;
    if context.persistence_id.is_none() {
        context.persistence_id = snapshot.tail_id().map(str::to_string);
    }

    let mut actor = Actor {
        snapshot,
        models: ModelRegistry::new(),
        context,
        transport,
        urls: UrlBuilder::new(client.root_url),
        store: store.map(|s| Arc::new(Mutex::new(s))),
        events_tx: events_tx.clone(),
        state_tx: Arc::clone(&state_tx),
        config,
    };

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if handle_command(cmd, &mut actor).await {
                break;
            }
        }
        debug!("pipeline runtime stopped");
    });

    PipelineHandle {
        cmd_tx,
        events_tx,
        state_tx,
        lock_tx: Arc::new(watch::channel(false).0),
        request_ids: Arc::new(AtomicU64::new(0)),
        policy,
    }
}

impl PipelineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events_tx.subscribe()
    }

    pub fn replay_state(&self) -> watch::Receiver<ReplayState> {
        self.state_tx.subscribe()
    }

    /// Replays from `request.changed_op_idx`. Under [`ReplayPolicy::Reject`] a
    /// request made while another replay runs fails with `ReplayInProgress`.
    pub async fn branch(&self, request: ReplayRequest) -> Result<ReplayReport, RuntimeError> {
        let request_id = self.request_ids.fetch_add(1, Ordering::Relaxed) + 1;
        if self.policy == ReplayPolicy::Reject {
            let mut running = None;
            let claimed = self.state_tx.send_if_modified(|state| match *state {
                ReplayState::Idle => {
                    *state = ReplayState::Replaying { request_id };
                    true
                }
                ReplayState::Replaying { request_id: current } => {
                    running = Some(current);
                    false
                }
            });
            if !claimed {
                let current = running.unwrap_or_default();
                warn!(request_id, running = current, "replay rejected, another one is running");
                return Err(ReplayError::ReplayInProgress(current).into());
            }
        }

        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Branch {
                request,
                request_id,
                resp: tx,
            })
            .await
            .is_err()
        {
            if self.policy == ReplayPolicy::Reject {
                self.state_tx.send_replace(ReplayState::Idle);
            }
            return Err(RuntimeError::ChannelClosed);
        }
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Prepares the form of step `idx` for editing; `None` for form-less steps.
    pub async fn edit_step(&self, idx: usize) -> Result<Option<FormArgs>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::EditStep { idx, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn update_form(&self, idx: usize, args: FormArgs) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::UpdateForm { idx, args, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn set_sort_kind(&self, idx: usize, kind: SortKind) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetSortKind { idx, kind, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn trim_after(&self, idx: usize) -> Result<Vec<OperationRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::TrimAfter { idx, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Replaces the pipeline with the server's view of `tail` (default: current tail).
    pub async fn reload(&self, tail: Option<ConcId>) -> Result<usize, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Reload { tail, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Submits a new step on top of the current tail. Returns the appended
    /// record, or `None` when the step resolved to a navigation.
    pub async fn submit_new(&self, args: FormArgs) -> Result<Option<OperationRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SubmitNew { args, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Marks a pending line-group operation. Does not go through the actor,
    /// so it takes effect while a replay is in flight.
    pub fn set_line_group_lock(&self, locked: bool) {
        let changed = self.lock_tx.send_if_modified(|current| {
            if *current == locked {
                return false;
            }
            *current = locked;
            true
        });
        if changed {
            debug!(locked, "line group lock changed");
            let _ = self
                .events_tx
                .send(PipelineEvent::LineGroupLockChanged { locked });
        }
    }

    pub fn line_group_locked(&self) -> bool {
        *self.lock_tx.borrow()
    }

    /// Current enablement of the mutating menu items, read from the shared
    /// lock flag and replay state.
    pub fn menu_state(&self) -> MenuState {
        let replay = *self.state_tx.borrow();
        MenuState::compute(self.line_group_locked(), replay)
    }

    pub async fn snapshot(&self) -> Result<PipelineSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Snapshot { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn context(&self) -> Result<ConcordanceContext, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Context { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Checkpoint { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command(cmd: Command, actor: &mut Actor) -> bool {
    match cmd {
        Command::Branch {
            request,
            request_id,
            resp,
        } => {
            let res = run_branch(actor, request, request_id).await;
            let _ = resp.send(res);
        }
        Command::EditStep { idx, resp } => {
            let _ = resp.send(edit_step(actor, idx).await);
        }
        Command::UpdateForm { idx, args, resp } => {
            let res = actor
                .snapshot
                .op_at(idx)
                .and_then(|op| {
                    if args.form_type() != op.form_type {
                        return Err(ReplayError::SyncTypeMismatch {
                            expected: op.form_type,
                            found: args.form_type(),
                        });
                    }
                    actor.models.set_form(&op.persistence_id, args)
                })
                .map_err(RuntimeError::from);
            let _ = resp.send(res);
        }
        Command::SetSortKind { idx, kind, resp } => {
            let res = actor
                .snapshot
                .op_at(idx)
                .and_then(|op| match op.form_type {
                    FormType::Sort => {
                        actor.models.sort.activate(&op.persistence_id, kind);
                        Ok(())
                    }
                    other => Err(ReplayError::SyncTypeMismatch {
                        expected: FormType::Sort,
                        found: other,
                    }),
                })
                .map_err(RuntimeError::from);
            let _ = resp.send(res);
        }
        Command::TrimAfter { idx, resp } => {
            let res = actor.snapshot.trim_after(idx).map_err(RuntimeError::from);
            if let Ok(removed) = &res {
                for op in removed {
                    actor.models.forget(&op.persistence_id);
                }
                actor.context.persistence_id = actor.snapshot.tail_id().map(str::to_string);
                info!(idx, removed = removed.len(), "pipeline trimmed");
                let _ = actor.events_tx.send(PipelineEvent::PipelineTrimmed {
                    len: actor.snapshot.len(),
                });
            }
            let _ = resp.send(res);
        }
        Command::Reload { tail, resp } => {
            let _ = resp.send(reload(actor, tail).await);
        }
        Command::SubmitNew { args, resp } => {
            let _ = resp.send(submit_new(actor, args).await);
        }
        Command::Snapshot { resp } => {
            let _ = resp.send(actor.snapshot.clone());
        }
        Command::Context { resp } => {
            let _ = resp.send(actor.context.clone());
        }
        Command::Checkpoint { resp } => {
            let _ = resp.send(checkpoint(actor).await);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(Ok(()));
            return true;
        }
    }

    false
}

async fn run_branch(
    actor: &mut Actor,
    request: ReplayRequest,
    request_id: RequestId,
) -> Result<ReplayReport, RuntimeError> {
    actor
        .state_tx
        .send_replace(ReplayState::Replaying { request_id });
    let _ = actor.events_tx.send(PipelineEvent::ReplayStarted {
        request_id,
        changed_op_idx: request.changed_op_idx,
    });

    let before = actor.snapshot.persistence_ids();
    let executor = ReplayExecutor::new(actor.transport.as_ref(), &actor.urls);
    let res = executor
        .run(request, &mut actor.snapshot, &mut actor.models, &actor.context)
        .await;

    let out = match res {
        Ok(report) => {
            match &report.outcome {
                ReplayOutcome::Appended {
                    operations,
                    context,
                    view_url,
                    messages,
                } => {
                    actor
                        .models
                        .forget_missing(&before, &actor.snapshot.operations);
                    actor.context = context.clone();
                    announce_append(actor, operations.clone(), view_url.clone(), messages).await;
                }
                ReplayOutcome::Navigated { url } => {
                    let _ = actor
                        .events_tx
                        .send(PipelineEvent::NavigationRequested { url: url.clone() });
                }
            }
            let _ = actor
                .events_tx
                .send(PipelineEvent::ReplayFinished { request_id });
            Ok(report)
        }
        Err(failure) => {
            warn!(
                request_id,
                failed_at = ?failure.failed_at,
                completed = failure.completed.len(),
                error = %failure.error,
                "replay failed"
            );
            let _ = actor.events_tx.send(PipelineEvent::ReplayFailed {
                request_id,
                failed_at: failure.failed_at,
                message: failure.to_string(),
            });
            Err(RuntimeError::from(failure))
        }
    };

    actor.state_tx.send_replace(ReplayState::Idle);
    out
}

async fn announce_append(
    actor: &mut Actor,
    operations: Vec<OperationRecord>,
    view_url: String,
    messages: &[String],
) {
    let tail = operations
        .last()
        .map(|op| op.persistence_id.clone())
        .unwrap_or_default();
    for text in messages {
        let _ = actor
            .events_tx
            .send(PipelineEvent::Message { text: text.clone() });
    }
    let _ = actor
        .events_tx
        .send(PipelineEvent::OperationAppended { operations, tail });
    let _ = actor
        .events_tx
        .send(PipelineEvent::NavigationRequested { url: view_url });

    if actor.config.persist_on_append {
        if let Err(err) = checkpoint(actor).await {
            warn!(error = ?err, "snapshot after append failed");
        }
    }
}

async fn edit_step(actor: &mut Actor, idx: usize) -> Result<Option<FormArgs>, RuntimeError> {
    let op = actor.snapshot.op_at(idx)?.clone();
    if op.form_type == FormType::Locked {
        return Err(ReplayError::OperationLocked { idx }.into());
    }
    let args = match actor.snapshot.forms_cache.get(&op.persistence_id) {
        Some(args) => args.clone(),
        None => {
            let tail = actor
                .snapshot
                .tail_id()
                .ok_or(ReplayError::EmptyPipeline)?
                .to_string();
            let loader = PipelineLoader::new(actor.transport.as_ref(), &actor.urls);
            let args = loader
                .fetch_form_args(&actor.context.corpname, &tail, idx)
                .await?;
            actor
                .snapshot
                .forms_cache
                .put(op.persistence_id.clone(), args.clone());
            args
        }
    };
    if args == FormArgs::Locked {
        return Err(ReplayError::OperationLocked { idx }.into());
    }
    actor
        .models
        .get_mut(op.form_type)
        .sync_from(&op.persistence_id, args)?;
    Ok(actor.models.get(op.form_type).form(&op.persistence_id))
}

async fn reload(actor: &mut Actor, tail: Option<ConcId>) -> Result<usize, RuntimeError> {
    let tail = match tail {
        Some(tail) => tail,
        None => actor
            .snapshot
            .tail_id()
            .ok_or(ReplayError::EmptyPipeline)?
            .to_string(),
    };
    let loader = PipelineLoader::new(actor.transport.as_ref(), &actor.urls);
    let loaded = loader.load_full(&actor.context.corpname, &tail).await?;
    let cache = loaded.to_cache();
    for id in actor.snapshot.persistence_ids() {
        actor.models.forget(&id);
    }
    actor.snapshot.replace(loaded.operations, cache);
    actor.context.persistence_id = actor.snapshot.tail_id().map(str::to_string);
    info!(tail = %tail, len = actor.snapshot.len(), "pipeline reloaded");

    for text in loaded.messages {
        let _ = actor.events_tx.send(PipelineEvent::Message { text });
    }
    let _ = actor
        .events_tx
        .send(PipelineEvent::PipelineReloaded { tail });
    Ok(actor.snapshot.len())
}

async fn submit_new(
    actor: &mut Actor,
    args: FormArgs,
) -> Result<Option<OperationRecord>, RuntimeError> {
    let form_type = args.form_type();
    actor.models.set_form(NEW_OP_KEY, args.clone())?;
    if actor.models.get(form_type).form(NEW_OP_KEY).is_none() {
        return Err(ReplayError::MissingDraft.into());
    }
    actor.snapshot.forms_cache.put_draft(args.clone());

    let draft = OperationRecord::draft(form_type);
    let base = match form_type {
        FormType::Query => actor.context.clone().without_persistence_id(),
        _ => {
            let tail = actor
                .snapshot
                .tail_id()
                .ok_or(ReplayError::EmptyPipeline)?
                .to_string();
            actor.context.clone().with_persistence_id(tail)
        }
    };
    let position = match form_type {
        FormType::Query => 0,
        _ => actor.snapshot.len(),
    };
    debug!(form_type = %form_type, position, "submitting new step");

    let ctx = SubmitContext {
        transport: actor.transport.as_ref(),
        urls: &actor.urls,
        concordance: base,
        op: &draft,
        position,
        is_last: false,
        disable_default_shuffle: false,
    };
    let outcome = actor.models.get(form_type).submit(NEW_OP_KEY, ctx).await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            actor.snapshot.forms_cache.take_draft();
            actor.models.forget(NEW_OP_KEY);
            return Err(err.into());
        }
    };
    actor.snapshot.forms_cache.take_draft();

    match outcome {
        StepOutcome::Concordance { response, context } => {
            let record = draft.advanced_by(&response);
            let before = actor.snapshot.persistence_ids();
            actor.models.rekey(NEW_OP_KEY, &record.persistence_id);
            actor.snapshot.append(record.clone(), Some(args));
            if let Some(overview) = &response.query_overview {
                actor.snapshot.operations = overview.clone();
                actor
                    .snapshot
                    .forms_cache
                    .retain_reachable(&actor.snapshot.operations);
            }
            let dropped = actor
                .models
                .forget_missing(&before, &actor.snapshot.operations);
            let view_url = actor.urls.create_action_url("view", &context.to_args());
            actor.context = context;
            info!(
                tail = %record.persistence_id,
                len = actor.snapshot.len(),
                dropped,
                "operation appended"
            );
            let operations = actor.snapshot.operations.clone();
            announce_append(actor, operations, view_url, &response.messages).await;
            Ok(Some(record))
        }
        StepOutcome::Navigate { url } => {
            actor.models.forget(NEW_OP_KEY);
            let _ = actor
                .events_tx
                .send(PipelineEvent::NavigationRequested { url });
            Ok(None)
        }
    }
}

async fn checkpoint(actor: &mut Actor) -> Result<(), RuntimeError> {
    let Some(store) = actor.store.as_ref() else {
        return Ok(());
    };
    let saved = SavedPipeline {
        snapshot: actor.snapshot.clone(),
        context: actor.context.clone(),
        saved_at_ms: now_ms(),
    };
    let tail = saved.tail_id().map(str::to_string);
    let keep = actor.config.keep_snapshots;
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let mut store = store.blocking_lock();
        store.save_snapshot(&saved)?;
        if keep > 0 {
            store.prune_keep_latest(keep)?;
        }
        Result::<(), PersistError>::Ok(())
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))??;

    debug!(tail = tail.as_deref().unwrap_or(""), "pipeline checkpointed");
    let _ = actor.events_tx.send(PipelineEvent::Checkpointed { tail });
    Ok(())
}
