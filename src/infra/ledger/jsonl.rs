//! File-backed ledger store using JSON lines.
//!
//! Events are appended one per line to `<dir>/<stream>.jsonl`. Pruning
//! rewrites the file with the surviving events.

use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::core::{ActionEvent, LedgerStore, StoreError};

/// Append-only JSONL file of action events.
#[derive(Debug, Clone)]
pub struct JsonlLedgerStore {
    path: PathBuf,
    stream: String,
}

impl JsonlLedgerStore {
    /// Store writing to `<path>/<stream>.jsonl`; the directory is created.
    pub fn new(path: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path)?;
        Ok(Self {
            path,
            stream: stream.into(),
        })
    }

    /// Full path of the backing file.
    pub fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
    }

    fn read_all(&self) -> Result<Vec<ActionEvent>, StoreError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(&file_path)?;
        let mut events = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActionEvent>(&line) {
                Ok(event) => events.push(event),
                // A torn final write must not lose the rest of the history.
                Err(e) => warn!(line = lineno + 1, error = %e, "skipping unreadable ledger line"),
            }
        }
        Ok(events)
    }

    fn rewrite(&self, events: &[ActionEvent]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.file_path())?;
        for event in events {
            writeln!(file, "{}", serde_json::to_string(event)?)?;
        }
        Ok(())
    }
}

impl LedgerStore for JsonlLedgerStore {
    fn append(&mut self, event: &ActionEvent) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path())?;
        writeln!(file, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }

    fn load_since(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<ActionEvent>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.at > cutoff)
            .collect())
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let all = self.read_all()?;
        let before = all.len();
        let kept: Vec<ActionEvent> = all.into_iter().filter(|e| e.at > cutoff).collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.rewrite(&kept)?;
        }
        Ok(removed)
    }
}
