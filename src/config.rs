use crate::clone::VoiceCloneConfig;
use crate::stt::RecognitionConfig;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub transcripts: TranscriptsConfig,
    pub recognizer: RecognizerSettings,
    /// Optional voice-clone hook; when absent the archive path is only
    /// logged on completion
    pub voice_clone: Option<VoiceCloneConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Directory call archives are written under
    pub recordings_path: String,
    /// Telephony sample rate (8000 Hz)
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptsConfig {
    /// Process-wide transcript CSV, shared across sessions
    pub ledger_path: String,
}

#[derive(Debug, Deserialize)]
pub struct RecognizerSettings {
    /// WebSocket endpoint of the streaming recognizer
    pub endpoint: String,
    pub language: String,
    /// In-flight frame bound before forwarding suspends
    pub channel_capacity: usize,
    /// Bound on draining results after stop
    pub drain_timeout_secs: u64,
}

impl Config {
    /// Load from a TOML file, with CALLSCRIBE__* environment overrides
    /// (e.g. CALLSCRIBE__RECOGNIZER__ENDPOINT).
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CALLSCRIBE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Recognition parameters declared when each session starts.
    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            sample_rate: self.audio.sample_rate,
            language: self.recognizer.language.clone(),
            ..RecognitionConfig::default()
        }
    }
}
