// Shared test doubles: a scripted recognition backend and a recording
// completion hook.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use callscribe::audio::{ArchiveSink, ArchiveSummary, AudioArchiver};
use callscribe::clone::CompletionHook;
use callscribe::ledger::{LedgerError, TranscriptRecord, TranscriptSink};
use callscribe::session::SessionOutcome;
use callscribe::stt::{
    RecognitionConfig, RecognizerBackend, RecognizerError, RecognizerStream, TranscriptResult,
};
use std::path::Path;
use std::sync::Mutex;

/// A transcription result the scripted backend emits once it has seen
/// `after_frames` audio frames. Cues whose threshold is never reached
/// are flushed after the stream stops, mirroring a backend that flushes
/// pending results on close.
pub struct Cue {
    pub after_frames: usize,
    pub result: TranscriptResult,
}

pub fn interim(after_frames: usize, text: &str) -> Cue {
    Cue {
        after_frames,
        result: TranscriptResult {
            text: text.to_string(),
            is_final: false,
        },
    }
}

pub fn fin(after_frames: usize, text: &str) -> Cue {
    Cue {
        after_frames,
        result: TranscriptResult {
            text: text.to_string(),
            is_final: true,
        },
    }
}

/// In-process recognition backend driven by a fixed script.
pub struct ScriptedRecognizer {
    script: Mutex<Option<Vec<Cue>>>,
    unavailable: bool,
    hang_up: bool,
    stall_after_flush: bool,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<Cue>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            unavailable: false,
            hang_up: false,
            stall_after_flush: false,
        }
    }

    /// A backend whose `start` always fails.
    pub fn unavailable() -> Self {
        Self {
            script: Mutex::new(None),
            unavailable: true,
            hang_up: false,
            stall_after_flush: false,
        }
    }

    /// A backend that drops its stream endpoints as soon as the stream
    /// opens: the first forwarded frame fails and the result sequence
    /// ends immediately.
    pub fn hangup() -> Self {
        Self {
            script: Mutex::new(None),
            unavailable: false,
            hang_up: true,
            stall_after_flush: false,
        }
    }

    /// A backend that flushes its script on stop but then holds the
    /// result channel open forever, never ending the sequence.
    pub fn stalling(script: Vec<Cue>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            unavailable: false,
            hang_up: false,
            stall_after_flush: true,
        }
    }
}

#[async_trait]
impl RecognizerBackend for ScriptedRecognizer {
    async fn start(&self, _config: RecognitionConfig) -> Result<RecognizerStream, RecognizerError> {
        if self.unavailable {
            return Err(RecognizerError::BackendUnavailable(
                "scripted outage".to_string(),
            ));
        }

        let (stream, endpoints) = RecognizerStream::channel(16);

        if self.hang_up {
            drop(endpoints);
            return Ok(stream);
        }

        let mut script = self
            .script
            .lock()
            .unwrap()
            .take()
            .expect("scripted recognizer started twice");
        let stall = self.stall_after_flush;

        tokio::spawn(async move {
            let mut audio_rx = endpoints.audio_rx;
            let results_tx = endpoints.results_tx;
            let mut frames_seen = 0usize;

            while audio_rx.recv().await.is_some() {
                frames_seen += 1;
                while script
                    .first()
                    .map(|cue| cue.after_frames <= frames_seen)
                    .unwrap_or(false)
                {
                    let cue = script.remove(0);
                    if results_tx.send(cue.result).await.is_err() {
                        return;
                    }
                }
            }

            // Stream stopped: flush whatever the script still holds,
            // then end the sequence by dropping the sender.
            for cue in script {
                if results_tx.send(cue.result).await.is_err() {
                    return;
                }
            }

            if stall {
                // Keep the result channel open so the sequence never
                // ends; the session's drain timeout has to cut it off.
                std::future::pending::<()>().await;
            }
        });

        Ok(stream)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Completion hook that records every outcome it is handed.
#[derive(Default)]
pub struct RecordingHook {
    pub outcomes: Mutex<Vec<SessionOutcome>>,
}

#[async_trait]
impl CompletionHook for RecordingHook {
    async fn on_session_complete(&self, outcome: &SessionOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

impl RecordingHook {
    pub fn fired(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }
}

/// Transcript sink whose appends always fail.
#[derive(Default)]
pub struct RejectingSink;

#[async_trait]
impl TranscriptSink for RejectingSink {
    async fn append(&self, _record: &TranscriptRecord) -> Result<(), LedgerError> {
        Err(LedgerError::Append(std::io::Error::new(
            std::io::ErrorKind::Other,
            "sink rejected the record",
        )))
    }
}

/// Archive sink that rejects appends after a fixed number of good ones,
/// delegating everything else to a real WAV archiver.
pub struct FlakyArchive {
    inner: AudioArchiver,
    appends_left: usize,
}

impl FlakyArchive {
    pub fn new(inner: AudioArchiver, good_appends: usize) -> Self {
        Self {
            inner,
            appends_left: good_appends,
        }
    }
}

impl ArchiveSink for FlakyArchive {
    fn append(&mut self, samples: &[i16]) -> Result<()> {
        if self.appends_left == 0 {
            anyhow::bail!("archive write rejected");
        }
        self.appends_left -= 1;
        self.inner.append(samples)
    }

    fn close(self: Box<Self>) -> Result<ArchiveSummary> {
        self.inner.close()
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }
}

/// A base64 media payload of `len` mu-law bytes (0xFF decodes to zero).
pub fn silent_payload(len: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(vec![0xFFu8; len])
}
