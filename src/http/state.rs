use crate::clone::CompletionHook;
use crate::config::Config;
use crate::ledger::TranscriptLedger;
use crate::stt::RecognizerBackend;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Recognition backend shared by all sessions; each session opens
    /// its own stream
    pub recognizer: Arc<dyn RecognizerBackend>,
    /// Process-wide transcript ledger
    pub ledger: Arc<TranscriptLedger>,
    /// Completion hook fired once per finished session
    pub hook: Arc<dyn CompletionHook>,
}
