//! Streaming speech-recognition bridge
//!
//! A `RecognizerBackend` owns the duplex relationship with an external
//! streaming recognizer: audio frames go in, an ordered lazy sequence of
//! partial/final results comes back. The stream splits into a sender half
//! (owned by the session's inbound flow) and a result half (owned by the
//! session's drain task), so the two flows progress independently.

pub mod ws;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

pub use ws::{WsRecognizer, WsRecognizerConfig};

/// Errors from the recognition bridge.
///
/// `BackendUnavailable` on start is fatal to transcription for the
/// session (no retry); the call's audio is still archived. Transport
/// failures mid-stream terminate the result sequence and are retrievable
/// from `ResultStream::failure` once the sequence ends.
#[derive(Debug, Clone, Error)]
pub enum RecognizerError {
    #[error("recognition backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("recognizer transport failed: {0}")]
    Transport(String),
    #[error("recognizer stream closed")]
    Closed,
}

/// One transcription result from the backend.
///
/// Results arrive in non-decreasing temporal order. Only `is_final`
/// results are durable; interim results are observed for liveness and
/// discarded. Finality is owned by the backend, never inferred here.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    pub text: String,
    pub is_final: bool,
}

/// Recognition parameters declared when a stream starts.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Input sample rate in Hz (telephony audio is 8000)
    pub sample_rate: u32,
    /// BCP-47 language code
    pub language: String,
    /// Request interim (non-final) results
    pub interim_results: bool,
    /// Request automatic punctuation
    pub punctuation: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            language: "en-US".to_string(),
            interim_results: true,
            punctuation: true,
        }
    }
}

/// A streaming recognition backend.
///
/// Implementations connect to the remote recognizer, declare the audio
/// format (8-bit mu-law for telephony), and wire the returned stream's
/// endpoints to the transport.
#[async_trait]
pub trait RecognizerBackend: Send + Sync {
    /// Open a new recognition stream. A closed stream cannot be resumed;
    /// callers needing to restart must call `start` again.
    async fn start(&self, config: RecognitionConfig) -> Result<RecognizerStream, RecognizerError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

type FailureSlot = Arc<Mutex<Option<RecognizerError>>>;

/// Backend-side handle for recording a terminal stream failure.
#[derive(Clone)]
pub struct FailureHandle(FailureSlot);

impl FailureHandle {
    /// Record the failure that terminated the result sequence. The first
    /// recorded failure wins.
    pub fn set(&self, err: RecognizerError) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(err);
        }
    }
}

/// An open duplex recognition stream.
pub struct RecognizerStream {
    sender: RecognizerSender,
    results: ResultStream,
}

/// Backend-side endpoints of a recognition stream.
pub struct StreamEndpoints {
    /// Frames sent by the session, closed when the session calls `stop`
    pub audio_rx: mpsc::Receiver<Bytes>,
    /// Results flowing back to the session's drain flow
    pub results_tx: mpsc::Sender<TranscriptResult>,
    /// Slot for the terminal failure, if any
    pub failure: FailureHandle,
}

impl RecognizerStream {
    /// Create a stream and its backend-side endpoints.
    ///
    /// The audio channel is bounded: a saturated transport suspends the
    /// sender rather than dropping frames.
    pub fn channel(capacity: usize) -> (Self, StreamEndpoints) {
        let (audio_tx, audio_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let failure: FailureSlot = Arc::new(Mutex::new(None));

        let stream = Self {
            sender: RecognizerSender {
                audio_tx: Some(audio_tx),
            },
            results: ResultStream {
                rx: results_rx,
                failure: Arc::clone(&failure),
            },
        };

        let endpoints = StreamEndpoints {
            audio_rx,
            results_tx,
            failure: FailureHandle(failure),
        };

        (stream, endpoints)
    }

    /// Split into the sender half and the result half so the inbound and
    /// drain flows can own them independently.
    pub fn split(self) -> (RecognizerSender, ResultStream) {
        (self.sender, self.results)
    }
}

/// Sender half: forwards undecoded frames to the backend.
pub struct RecognizerSender {
    audio_tx: Option<mpsc::Sender<Bytes>>,
}

impl RecognizerSender {
    /// Forward one frame. Suspends under transport backpressure; never
    /// silently drops a frame.
    pub async fn send(&self, frame: Bytes) -> Result<(), RecognizerError> {
        match &self.audio_tx {
            Some(tx) => tx.send(frame).await.map_err(|_| RecognizerError::Closed),
            None => Err(RecognizerError::Closed),
        }
    }

    /// Signal that no more frames will be sent. The backend flushes any
    /// pending final result before ending the result sequence, so callers
    /// must keep draining results after stopping.
    pub fn stop(&mut self) {
        self.audio_tx = None;
    }
}

/// Result half: ordered sequence of results, ending when the backend
/// closes the stream or the transport fails.
pub struct ResultStream {
    rx: mpsc::Receiver<TranscriptResult>,
    failure: FailureSlot,
}

impl ResultStream {
    /// Next result, or `None` once the sequence has ended.
    pub async fn next(&mut self) -> Option<TranscriptResult> {
        self.rx.recv().await
    }

    /// The failure that terminated the sequence, if it ended abnormally.
    pub fn failure(&self) -> Option<RecognizerError> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }
}
