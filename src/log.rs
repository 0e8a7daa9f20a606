use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use std::fs::{OpenOptions, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use anyhow::{Result, Context};
use chrono::Utc;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Rejected,
    NotFound,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub session_id: String,
    pub peer: String,
    pub verb: Option<String>,
    pub filename: Option<String>,
    pub status: TransferStatus,
    pub bytes_sent: u64,
    pub error: Option<String>,
}

impl TransferLogEntry {
    pub fn new(peer: String, status: TransferStatus) -> Self {
        TransferLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            session_id: Uuid::new_v4().to_string(),
            peer,
            verb: None,
            filename: None,
            status,
            bytes_sent: 0,
            error: None,
        }
    }
}

/// Append-only JSONL audit of finished sessions
pub struct TransferLog {
    log_file_path: PathBuf,
}

impl TransferLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        TransferLog { log_file_path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.log_file_path
    }

    /// Append one record as a single JSON line.
    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .with_context(|| format!("open {}", self.log_file_path.display()))?;
        // One write per record so a partial line never precedes the next one
        file.write_all(&line)?;
        Ok(())
    }

    /// Every record in file order; a missing file reads as empty.
    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        let file = match File::open(&self.log_file_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("open {}", self.log_file_path.display()))
            }
        };
        BufReader::new(file)
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
            .map(|(i, line)| -> Result<TransferLogEntry> {
                let line = line?;
                serde_json::from_str(&line).with_context(|| {
                    format!("{} line {}", self.log_file_path.display(), i + 1)
                })
            })
            .collect()
    }
}
