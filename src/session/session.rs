use super::config::SessionConfig;
use super::stats::{SessionOutcome, SessionState, SessionStats};
use crate::audio::{decode_mulaw, ArchiveSink, AudioArchiver, DecodeError};
use crate::clone::CompletionHook;
use crate::ledger::{TranscriptRecord, TranscriptSink};
use crate::stt::{RecognizerBackend, RecognizerError, RecognizerSender, ResultStream};
use anyhow::{Context, Result};
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One call's audio/transcription pipeline.
///
/// The session fans out into two flows that share nothing but the
/// per-call handles: the inbound flow (this struct, driven by the media
/// WebSocket task) decodes, archives and forwards each frame; the drain
/// flow (a spawned task) consumes recognition results and persists the
/// final ones. The flows join only in `finish`, which closes the archive
/// and fires the completion hook exactly once.
pub struct StreamSession {
    config: SessionConfig,
    started_at: DateTime<Utc>,
    state: SessionState,

    /// Owned exclusively by the inbound flow; appends are therefore
    /// strictly ordered by frame arrival.
    archiver: Box<dyn ArchiveSink>,

    /// Sender half of the recognizer stream; None when the backend
    /// failed to start (archive-only degraded mode) or after a
    /// transport failure.
    sender: Option<RecognizerSender>,

    /// Drain flow handle, joined in `finish`; resolves to the failure
    /// that terminated the result sequence, if any
    drain_task: Option<JoinHandle<Option<RecognizerError>>>,

    /// Counters the drain flow updates as it goes, so a drain cut off
    /// by the timeout still surfaces what it persisted
    drain_counters: Arc<DrainCounters>,

    hook: Arc<dyn CompletionHook>,
    stats: SessionStats,
}

/// Shared between the session and its drain flow. Updated per result,
/// read once when the session closes.
#[derive(Debug, Default)]
struct DrainCounters {
    interim_results: AtomicUsize,
    final_results: AtomicUsize,
    ledger_write_failures: AtomicUsize,
    /// The last observed result was interim: its text was never
    /// finalized by the backend and is discarded.
    last_was_interim: AtomicBool,
}

impl StreamSession {
    /// Open the per-call resources: the archive file and the
    /// recognition stream, both before the first frame is processed.
    ///
    /// An unwritable archive path is fatal. An unreachable recognition
    /// backend is not: the session continues archive-only, with the
    /// degradation surfaced to the operator.
    pub async fn open(
        config: SessionConfig,
        recognizer: &dyn RecognizerBackend,
        ledger: Arc<dyn TranscriptSink>,
        hook: Arc<dyn CompletionHook>,
    ) -> Result<Self> {
        let started_at = Utc::now();

        let archive_path = config.archive_path(started_at);
        let archiver = AudioArchiver::open(&archive_path, config.recognition.sample_rate)
            .with_context(|| format!("Failed to open archive for call {}", config.call_id))?;

        Ok(Self::with_archive(config, started_at, Box::new(archiver), recognizer, ledger, hook)
            .await)
    }

    /// Open a session over an already-prepared archive sink.
    pub async fn with_archive(
        config: SessionConfig,
        started_at: DateTime<Utc>,
        archiver: Box<dyn ArchiveSink>,
        recognizer: &dyn RecognizerBackend,
        ledger: Arc<dyn TranscriptSink>,
        hook: Arc<dyn CompletionHook>,
    ) -> Self {
        info!("Opening stream session: {}", config.call_id);

        let counters = Arc::new(DrainCounters::default());

        let (sender, drain_task) = match recognizer.start(config.recognition.clone()).await {
            Ok(stream) => {
                let (sender, results) = stream.split();
                let task = tokio::spawn(drain_results(
                    results,
                    ledger,
                    config.call_id.clone(),
                    archiver.path().to_path_buf(),
                    Arc::clone(&counters),
                ));
                (Some(sender), Some(task))
            }
            Err(e) => {
                // No retry: a partial (or absent) transcript is the
                // accepted degraded behavior. Audio is still archived.
                error!(
                    "Recognition backend unavailable for call {}; continuing archive-only: {}",
                    config.call_id, e
                );
                (None, None)
            }
        };

        Self {
            config,
            started_at,
            state: SessionState::Streaming,
            archiver,
            sender,
            drain_task,
            drain_counters: counters,
            hook,
            stats: SessionStats::default(),
        }
    }

    /// Handle one inbound media event carrying a base64 payload.
    pub async fn handle_media(&mut self, payload_b64: &str) {
        match base64::engine::general_purpose::STANDARD.decode(payload_b64) {
            Ok(frame) => self.handle_frame(Bytes::from(frame)).await,
            Err(e) => {
                self.stats.frames_received += 1;
                self.record_decode_failure(DecodeError::InvalidPayload(e.to_string()));
            }
        }
    }

    /// Process one mu-law frame: decode + archive, and forward the
    /// identical undecoded bytes to the recognizer. Neither branch is
    /// derived from the other's output.
    pub async fn handle_frame(&mut self, frame: Bytes) {
        self.stats.frames_received += 1;

        match decode_mulaw(&frame) {
            Ok(pcm) => match self.archiver.append(&pcm) {
                Ok(()) => self.stats.frames_archived += 1,
                Err(e) => {
                    // Best-effort continue; the frame's audio is lost.
                    self.stats.archive_write_failures += 1;
                    warn!("Archive write failed for call {}: {}", self.config.call_id, e);
                }
            },
            Err(e) => self.record_decode_failure(e),
        }

        let mut forward_failed = false;
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(frame).await {
                warn!(
                    "Recognizer stream closed for call {}; no further frames forwarded: {}",
                    self.config.call_id, e
                );
                forward_failed = true;
            }
        }
        if forward_failed {
            self.stats.forward_failures += 1;
            self.sender = None;
        }
    }

    fn record_decode_failure(&mut self, e: DecodeError) {
        self.stats.decode_failures += 1;
        warn!("Skipping undecodable frame for call {}: {}", self.config.call_id, e);
    }

    /// Current session counters.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Lifecycle state, for diagnostics.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drain, close and fire the completion hook.
    ///
    /// Stops the recognizer stream, waits (bounded) for the drain flow
    /// to exhaust the result sequence so the last finalized segment is
    /// not lost, finalizes the archive, and invokes the hook exactly
    /// once with the finished archive. The hook is skipped only when the
    /// archive could not be produced.
    pub async fn finish(mut self) -> Result<SessionOutcome> {
        self.state = SessionState::Draining;
        info!("Draining stream session: {}", self.config.call_id);

        if let Some(mut sender) = self.sender.take() {
            sender.stop();
        }

        if let Some(mut task) = self.drain_task.take() {
            match tokio::time::timeout(self.config.drain_timeout, &mut task).await {
                Ok(Ok(Some(failure))) => error!(
                    "Recognition ended abnormally for call {}: {}",
                    self.config.call_id, failure
                ),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => error!("Drain task failed for call {}: {}", self.config.call_id, e),
                Err(_) => {
                    warn!(
                        "Result drain timed out after {:?} for call {}; abandoning remaining results",
                        self.config.drain_timeout, self.config.call_id
                    );
                    task.abort();
                }
            }
        }

        // Read the counters after the drain has ended (or been cut
        // off): they reflect exactly what was persisted.
        self.stats.interim_results = self.drain_counters.interim_results.load(Ordering::Relaxed);
        self.stats.final_results = self.drain_counters.final_results.load(Ordering::Relaxed);
        self.stats.ledger_write_failures = self
            .drain_counters
            .ledger_write_failures
            .load(Ordering::Relaxed);
        if self.drain_counters.last_was_interim.load(Ordering::Relaxed) {
            warn!(
                "Call {} ended with an unfinalized interim result; segment discarded",
                self.config.call_id
            );
        }

        let archive = self
            .archiver
            .close()
            .with_context(|| format!("Failed to finalize archive for call {}", self.config.call_id))?;

        self.state = SessionState::Closed;

        let outcome = SessionOutcome {
            call_id: self.config.call_id.clone(),
            caller: self.config.caller.clone(),
            started_at: self.started_at,
            archive,
            stats: self.stats.clone(),
        };

        info!(
            "Session closed: {} ({:.2}s audio, {} final segments, {} frames)",
            outcome.call_id,
            outcome.archive.duration_secs,
            outcome.stats.final_results,
            outcome.stats.frames_received
        );

        self.hook.on_session_complete(&outcome).await;

        Ok(outcome)
    }
}

/// Drain flow: consume the ordered result sequence until it ends,
/// persisting exactly the final results, in arrival order. Returns the
/// failure that terminated the sequence, if it ended abnormally.
async fn drain_results(
    mut results: ResultStream,
    ledger: Arc<dyn TranscriptSink>,
    call_id: String,
    audio_path: PathBuf,
    counters: Arc<DrainCounters>,
) -> Option<RecognizerError> {
    while let Some(result) = results.next().await {
        if result.is_final {
            counters.final_results.fetch_add(1, Ordering::Relaxed);
            counters.last_was_interim.store(false, Ordering::Relaxed);
            info!("Final transcript [{}]: {}", call_id, result.text);

            let record = TranscriptRecord {
                timestamp: Utc::now(),
                call_id: call_id.clone(),
                text: result.text,
                audio_path: audio_path.clone(),
            };

            if let Err(e) = ledger.append(&record).await {
                // Non-fatal: the record is lost, the session continues.
                counters.ledger_write_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Ledger append failed [{}]: {}", call_id, e);
            }
        } else {
            counters.interim_results.fetch_add(1, Ordering::Relaxed);
            counters.last_was_interim.store(true, Ordering::Relaxed);
            debug!("Interim transcript [{}]: {}", call_id, result.text);
        }
    }

    results.failure()
}
