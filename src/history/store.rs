//! SQLite backed history.

use chrono::Utc;
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;

use super::{HistoryError, HistoryStore};
use crate::probe::{ProbeMethod, Snapshot};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    time TEXT NOT NULL,
    method TEXT NOT NULL,
    target TEXT NOT NULL,
    latency REAL NOT NULL,
    bandwidth REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_target ON snapshots (method, target, id);
";

/// History stored in SQLite. Every `record` is written immediately.
pub struct SqliteHistoryStore {
    conn: Connection,
    retention: Option<usize>,
}

impl SqliteHistoryStore {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P, retention: Option<usize>) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, retention)
    }

    #[cfg(test)]
    pub fn in_memory(retention: Option<usize>) -> Result<Self, HistoryError> {
        Self::with_connection(Connection::open_in_memory()?, retention)
    }

    fn with_connection(conn: Connection, retention: Option<usize>) -> Result<Self, HistoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, retention })
    }

    /// Number of snapshots kept for a target.
    #[cfg(test)]
    pub fn count(&self, method: ProbeMethod, target: &str) -> Result<i64, HistoryError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE method = ?1 AND target = ?2",
            params![method.as_str(), target],
            |r| r.get(0),
        )?)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn history_for(&self, method: ProbeMethod, target: &str) -> Result<Vec<Snapshot>, HistoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT latency, bandwidth FROM snapshots WHERE method = ?1 AND target = ?2 ORDER BY id ASC",
        )?;

        let snapshots = stmt
            .query_map(params![method.as_str(), target], |row| {
                Ok(Snapshot {
                    latency: row.get(0)?,
                    bandwidth: row.get(1)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(snapshots)
    }

    fn record(&mut self, method: ProbeMethod, target: &str, snapshot: Snapshot) -> Result<(), HistoryError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO snapshots (time, method, target, latency, bandwidth) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().format("%Y-%m-%d %H:%M:%S%.9f").to_string(),
                method.as_str(),
                target,
                snapshot.latency,
                snapshot.bandwidth,
            ],
        )?;

        if let Some(keep) = self.retention {
            tx.execute(
                "DELETE FROM snapshots WHERE method = ?1 AND target = ?2 AND id NOT IN (
                     SELECT id FROM snapshots WHERE method = ?1 AND target = ?2 ORDER BY id DESC LIMIT ?3
                 )",
                params![method.as_str(), target, keep as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
