use super::config::CallerInfo;
use crate::audio::ArchiveSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle states of a stream session.
///
/// A session is constructed already `Streaming` (its resources are
/// opened before the first frame); `finish` moves it through `Draining`
/// to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Streaming,
    Draining,
    Closed,
}

/// Counters accumulated over one session.
///
/// Per-frame failures are counted here rather than aborting the session:
/// the call itself is never affected by transcription trouble.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    /// Media frames received on the inbound channel
    pub frames_received: usize,
    /// Frames successfully decoded and archived
    pub frames_archived: usize,
    /// Frames skipped because decoding failed
    pub decode_failures: usize,
    /// Decoded frames lost to archive write errors
    pub archive_write_failures: usize,
    /// Frames that could not be forwarded to the recognizer
    pub forward_failures: usize,
    /// Interim results observed (never persisted)
    pub interim_results: usize,
    /// Final results persisted to the ledger
    pub final_results: usize,
    /// Final results lost to ledger write errors
    pub ledger_write_failures: usize,
}

/// Everything the completion hook receives when a session closes.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub call_id: String,
    pub caller: CallerInfo,
    pub started_at: DateTime<Utc>,
    /// The finalized call archive
    pub archive: ArchiveSummary,
    pub stats: SessionStats,
}
