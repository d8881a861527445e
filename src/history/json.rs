//! JSON file backed history.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{History, HistoryEntries, HistoryError, HistoryStore};
use crate::probe::{ProbeMethod, Snapshot};

/// History kept in memory during a batch and written back as one JSON
/// document on `flush`.
pub struct JsonHistoryStore {
    path: PathBuf,
    history: History,
}

impl JsonHistoryStore {
    /// Load the history file, starting empty if it does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P, retention: Option<usize>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();

        let entries: HistoryEntries = match fs::read_to_string(&path) {
            Ok(data) => {
                let entries = serde_json::from_str(&data)?;
                tracing::debug!("History file {} loaded", path.display());
                entries
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("History file {} not found. Initializing new history", path.display());
                HistoryEntries::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            history: History::from_entries(entries, retention),
        })
    }

    #[cfg(test)]
    pub fn history(&self) -> &History {
        &self.history
    }
}

impl HistoryStore for JsonHistoryStore {
    fn history_for(&self, method: ProbeMethod, target: &str) -> Result<Vec<Snapshot>, HistoryError> {
        self.history.history_for(method, target)
    }

    fn record(&mut self, method: ProbeMethod, target: &str, snapshot: Snapshot) -> Result<(), HistoryError> {
        self.history.record(method, target, snapshot)
    }

    /// Write via a sibling temp file so a failed write leaves the old file intact.
    fn flush(&mut self) -> Result<(), HistoryError> {
        let data = serde_json::to_string(self.history.entries())?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!("History file {} saved", self.path.display());
        Ok(())
    }
}
