//! History of snapshots per (method, target).
//!
//! The regression post-check only reads the most recent entry; stores keep
//! the whole sequence, oldest first.

mod json;
mod store;

pub use json::*;
pub use store::*;

use crate::probe::{ProbeMethod, Snapshot};

use std::collections::BTreeMap;
use thiserror::Error;

/// History error types.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Source and sink of snapshots.
pub trait HistoryStore: Send {
    /// Prior snapshots for a target, oldest first. Unknown targets have an
    /// empty history.
    fn history_for(&self, method: ProbeMethod, target: &str) -> Result<Vec<Snapshot>, HistoryError>;

    /// Append a snapshot after the existing ones.
    fn record(&mut self, method: ProbeMethod, target: &str, snapshot: Snapshot) -> Result<(), HistoryError>;

    /// Persist anything still buffered.
    fn flush(&mut self) -> Result<(), HistoryError> {
        Ok(())
    }
}

/// Method name -> target -> snapshots, as laid out in the history file.
pub type HistoryEntries = BTreeMap<String, BTreeMap<String, Vec<Snapshot>>>;

/// In-memory history.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: HistoryEntries,
    retention: Option<usize>,
}

impl History {
    #[cfg(test)]
    pub fn new(retention: Option<usize>) -> Self {
        Self {
            entries: BTreeMap::new(),
            retention,
        }
    }

    pub fn from_entries(entries: HistoryEntries, retention: Option<usize>) -> Self {
        Self { entries, retention }
    }

    pub fn entries(&self) -> &HistoryEntries {
        &self.entries
    }

    /// Snapshots for a target, oldest first.
    pub fn get(&self, method: ProbeMethod, target: &str) -> &[Snapshot] {
        self.entries
            .get(method.as_str())
            .and_then(|targets| targets.get(target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn push(&mut self, method: ProbeMethod, target: &str, snapshot: Snapshot) {
        let snapshots = self
            .entries
            .entry(method.as_str().to_string())
            .or_default()
            .entry(target.to_string())
            .or_default();
        snapshots.push(snapshot);

        if let Some(keep) = self.retention {
            if snapshots.len() > keep {
                let excess = snapshots.len() - keep;
                snapshots.drain(..excess);
            }
        }
    }
}

impl HistoryStore for History {
    fn history_for(&self, method: ProbeMethod, target: &str) -> Result<Vec<Snapshot>, HistoryError> {
        Ok(self.get(method, target).to_vec())
    }

    fn record(&mut self, method: ProbeMethod, target: &str, snapshot: Snapshot) -> Result<(), HistoryError> {
        self.push(method, target, snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(latency: f64) -> Snapshot {
        Snapshot { latency, bandwidth: 1.0 }
    }

    #[test]
    fn test_unknown_target_is_empty() {
        let history = History::default();
        assert!(history.get(ProbeMethod::Http, "http://nowhere/").is_empty());
        assert!(history
            .history_for(ProbeMethod::Dns, "nowhere")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_push_keeps_order_per_method() {
        let mut history = History::default();
        history.push(ProbeMethod::Http, "a", snap(0.1));
        history.push(ProbeMethod::Http, "a", snap(0.2));
        history.push(ProbeMethod::Https, "a", snap(0.9));

        assert_eq!(history.get(ProbeMethod::Http, "a"), &[snap(0.1), snap(0.2)]);
        assert_eq!(history.get(ProbeMethod::Https, "a").last(), Some(&snap(0.9)));
    }

    #[test]
    fn test_retention_drops_oldest() {
        let mut history = History::new(Some(2));
        for i in 1..=4 {
            history.push(ProbeMethod::Http, "a", snap(i as f64));
        }
        assert_eq!(history.get(ProbeMethod::Http, "a"), &[snap(3.0), snap(4.0)]);
    }
}
