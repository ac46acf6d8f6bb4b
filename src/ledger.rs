//! Append-only transcript ledger
//!
//! One CSV file shared by every session in the process. Rows are
//! `(timestamp, call id, transcript text, audio file path)`. The header
//! is written exactly once, when the file is first created; appends from
//! concurrent sessions are serialized through a single writer so a row
//! is never interleaved with another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

const LEDGER_HEADER: &str = "Timestamp,Call SID,Transcript,Audio File\n";

/// Ledger write failures are non-fatal: the orchestrator counts the
/// lost record and the session continues.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open transcript ledger {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to append transcript record: {0}")]
    Append(#[from] std::io::Error),
}

/// One finalized transcript line. Immutable once written.
#[derive(Debug, Clone)]
pub struct TranscriptRecord {
    pub timestamp: DateTime<Utc>,
    pub call_id: String,
    pub text: String,
    pub audio_path: PathBuf,
}

/// Sink for finalized transcript records. The session's drain flow
/// writes through this trait; `TranscriptLedger` is the CSV-file
/// implementation.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn append(&self, record: &TranscriptRecord) -> Result<(), LedgerError>;
}

#[async_trait]
impl TranscriptSink for TranscriptLedger {
    async fn append(&self, record: &TranscriptRecord) -> Result<(), LedgerError> {
        TranscriptLedger::append(self, record).await
    }
}

/// Process-wide transcript log.
pub struct TranscriptLedger {
    inner: Mutex<File>,
    path: PathBuf,
}

impl TranscriptLedger {
    /// Open (or create) the ledger file. A newly created or empty file
    /// gets the header row first; an existing ledger is appended to,
    /// never re-headered.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LedgerError::Open {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let needs_header = match fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LedgerError::Open {
                path: path.clone(),
                source,
            })?;

        if needs_header {
            file.write_all(LEDGER_HEADER.as_bytes())?;
            info!("Transcript ledger created: {:?}", path);
        } else {
            info!("Transcript ledger opened: {:?}", path);
        }

        Ok(Self {
            inner: Mutex::new(file),
            path,
        })
    }

    /// Append one record. The whole row is written under the writer lock
    /// in a single call, so concurrent sessions never produce a partial
    /// or interleaved row.
    pub async fn append(&self, record: &TranscriptRecord) -> Result<(), LedgerError> {
        let row = format!(
            "{},{},{},{}\n",
            csv_field(&record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            csv_field(&record.call_id),
            csv_field(&record.text),
            csv_field(&record.audio_path.display().to_string()),
        );

        let mut file = self.inner.lock().await;
        file.write_all(row.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
