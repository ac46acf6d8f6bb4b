//! Session completion hook
//!
//! Fired exactly once per session, after the archive is finalized and
//! the result drain has finished. The production hook submits the call
//! recording to a voice-cloning service; failures are surfaced to the
//! operator and never retried, and never affect the session result.

use crate::session::SessionOutcome;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Invoked when a session closes with a finished archive.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_session_complete(&self, outcome: &SessionOutcome);
}

/// Default hook when voice cloning is not configured: just reports the
/// archive location.
pub struct LogHook;

#[async_trait]
impl CompletionHook for LogHook {
    async fn on_session_complete(&self, outcome: &SessionOutcome) {
        info!(
            "Call {} complete; archive at {:?}",
            outcome.call_id, outcome.archive.path
        );
    }
}

/// Voice-clone service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceCloneConfig {
    /// Voice-creation endpoint, e.g. "https://api.sws.speechify.com/v1/voices"
    pub endpoint: String,
    /// API key sent as the Authorization header
    pub api_key: String,
    /// Display name for the created voice
    pub voice_name: String,
}

/// Uploads the finished call recording to the voice-cloning service,
/// with a consent payload built from the caller identity threaded
/// through the session.
pub struct VoiceCloneHook {
    config: VoiceCloneConfig,
    client: reqwest::Client,
}

impl VoiceCloneHook {
    pub fn new(config: VoiceCloneConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    async fn submit(&self, outcome: &SessionOutcome) -> anyhow::Result<()> {
        let sample = tokio::fs::read(&outcome.archive.path).await?;

        let consent = serde_json::json!({
            "fullName": outcome.caller.name,
            "email": outcome.caller.email,
        });

        let form = reqwest::multipart::Form::new()
            .part(
                "sample",
                reqwest::multipart::Part::bytes(sample)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("name", self.config.voice_name.clone())
            .text("consent", consent.to_string());

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", &self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            info!("Voice clone submitted for call {}: {}", outcome.call_id, status);
        } else {
            warn!(
                "Voice clone rejected for call {}: {} - {}",
                outcome.call_id, status, body
            );
        }

        Ok(())
    }
}

#[async_trait]
impl CompletionHook for VoiceCloneHook {
    async fn on_session_complete(&self, outcome: &SessionOutcome) {
        if let Err(e) = self.submit(outcome).await {
            error!("Voice clone submission failed for call {}: {}", outcome.call_id, e);
        }
    }
}
