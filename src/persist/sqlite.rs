//! SQLite-backed pipeline snapshot store.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PersistError, PersistResult, SavedPipeline, SnapshotStore};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    saved: SavedPipeline,
}

/// SQLite implementation of [`crate::persist::SnapshotStore`].
pub struct SqliteSnapshotStore {
    conn: Connection,
}

impl SqliteSnapshotStore {
    /// Opens or creates a store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> PersistResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pipeline_snapshots", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn load_one(&self, sql: &str, arg: Option<&str>) -> PersistResult<Option<SavedPipeline>> {
        let payload: Option<Vec<u8>> = match arg {
            Some(tail) => self
                .conn
                .query_row(sql, params![tail], |row| row.get(0))
                .optional()?,
            None => self.conn.query_row(sql, [], |row| row.get(0)).optional()?,
        };
        let Some(payload) = payload else {
            return Ok(None);
        };
        decode_payload(&payload).map(Some)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save_snapshot(&mut self, saved: &SavedPipeline) -> PersistResult<i64> {
        let env = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved: saved.clone(),
        };
        let payload = serde_json::to_vec(&env)?;
        let ts_ms = if saved.saved_at_ms == 0 {
            now_ms()
        } else {
            saved.saved_at_ms
        };
        self.conn.execute(
            "INSERT INTO pipeline_snapshots(tail_id, op_count, ts_ms, payload) VALUES (?1, ?2, ?3, ?4)",
            params![
                saved.tail_id(),
                saved.snapshot.len() as i64,
                ts_ms as i64,
                payload
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, tail = saved.tail_id().unwrap_or(""), "pipeline snapshot saved");
        Ok(id)
    }

    fn load_latest(&self) -> PersistResult<Option<SavedPipeline>> {
        self.load_one(
            "SELECT payload FROM pipeline_snapshots ORDER BY id DESC LIMIT 1",
            None,
        )
    }

    fn load_by_tail(&self, tail: &str) -> PersistResult<Option<SavedPipeline>> {
        self.load_one(
            "SELECT payload FROM pipeline_snapshots WHERE tail_id = ?1 ORDER BY id DESC LIMIT 1",
            Some(tail),
        )
    }

    fn prune_keep_latest(&mut self, keep: usize) -> PersistResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM pipeline_snapshots WHERE id NOT IN \
             (SELECT id FROM pipeline_snapshots ORDER BY id DESC LIMIT ?1)",
            params![keep as i64],
        )?;
        Ok(removed)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn decode_payload(payload: &[u8]) -> PersistResult<SavedPipeline> {
    let env: SnapshotEnvelope = serde_json::from_slice(payload)?;
    if env.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(PersistError::Message(format!(
            "unsupported snapshot format version: {}",
            env.format_version
        )));
    }
    Ok(env.saved)
}
