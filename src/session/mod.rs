//! Stream session management
//!
//! This module provides the `StreamSession` orchestrator that owns one
//! call's lifecycle:
//! - Archive file + recognition stream opened before the first frame
//! - Inbound flow: decode + archive + forward, per frame
//! - Drain flow: persist final transcription results, in order
//! - Clean close joining both flows, then the completion hook

mod config;
mod session;
mod stats;

pub use config::{CallerInfo, SessionConfig};
pub use session::StreamSession;
pub use stats::{SessionOutcome, SessionState, SessionStats};
