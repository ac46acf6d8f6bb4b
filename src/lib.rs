pub mod audio;
pub mod clone;
pub mod config;
pub mod http;
pub mod ledger;
pub mod session;
pub mod stt;

pub use audio::{decode_mulaw, ArchiveSink, ArchiveSummary, AudioArchiver, DecodeError};
pub use clone::{CompletionHook, LogHook, VoiceCloneConfig, VoiceCloneHook};
pub use config::Config;
pub use http::{create_router, AppState};
pub use ledger::{LedgerError, TranscriptLedger, TranscriptRecord, TranscriptSink};
pub use session::{
    CallerInfo, SessionConfig, SessionOutcome, SessionState, SessionStats, StreamSession,
};
pub use stt::{
    RecognitionConfig, RecognizerBackend, RecognizerError, RecognizerSender, RecognizerStream,
    ResultStream, StreamEndpoints, TranscriptResult, WsRecognizer, WsRecognizerConfig,
};
