use crate::stt::RecognitionConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Identity of the person on the call, threaded explicitly from call
/// initiation through to the completion hook. Never recovered from
/// ambient request state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallerInfo {
    pub name: String,
    pub email: String,
}

/// Configuration for one call's stream session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Call identifier (e.g. the telephony provider's call SID)
    pub call_id: String,

    /// Who is on the call; forwarded to the completion hook
    pub caller: CallerInfo,

    /// Directory the call archive is written under
    pub recordings_dir: PathBuf,

    /// Recognition parameters declared to the backend
    pub recognition: RecognitionConfig,

    /// Upper bound on draining pending results after stop. The backend
    /// is expected to close promptly; this guards against one that
    /// never does.
    pub drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_id: format!("call-{}", uuid::Uuid::new_v4()),
            caller: CallerInfo::default(),
            recordings_dir: PathBuf::from("recordings"),
            recognition: RecognitionConfig::default(),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Deterministic archive path from session start time and call id.
    pub fn archive_path(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.recordings_dir.join(format!(
            "{}_{}.wav",
            started_at.format("%Y%m%d_%H%M%S"),
            self.call_id
        ))
    }
}
