pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::{context::ConcordanceContext, core::pipeline::PipelineSnapshot};

#[derive(Debug)]
pub enum PersistError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    Message(String),
}

impl From<rusqlite::Error> for PersistError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Pipeline session as written to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPipeline {
    pub snapshot: PipelineSnapshot,
    pub context: ConcordanceContext,
    pub saved_at_ms: u64,
}

impl SavedPipeline {
    pub fn tail_id(&self) -> Option<&str> {
        self.snapshot.tail_id()
    }
}

/// Durable storage for pipeline sessions.
pub trait SnapshotStore: Send {
    /// Writes `saved` and returns its row id.
    fn save_snapshot(&mut self, saved: &SavedPipeline) -> PersistResult<i64>;
    fn load_latest(&self) -> PersistResult<Option<SavedPipeline>>;
    /// Most recent snapshot whose pipeline ends at `tail`.
    fn load_by_tail(&self, tail: &str) -> PersistResult<Option<SavedPipeline>>;
    /// Deletes all but the newest `keep` snapshots; returns the number removed.
    fn prune_keep_latest(&mut self, _keep: usize) -> PersistResult<usize> {
        Ok(0)
    }
}
