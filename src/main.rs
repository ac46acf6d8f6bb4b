use anyhow::Result;
use callscribe::clone::{CompletionHook, LogHook, VoiceCloneHook};
use callscribe::stt::{RecognizerBackend, WsRecognizer, WsRecognizerConfig};
use callscribe::{create_router, AppState, Config, TranscriptLedger};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "callscribe", about = "Real-time call transcription and archiving")]
struct Args {
    /// Config file (without extension), e.g. config/callscribe
    #[arg(long, default_value = "config/callscribe")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Arc::new(Config::load(&args.config)?);

    info!("callscribe v0.1.0");
    info!("Loaded config: {}", config.service.name);
    info!("Recordings directory: {}", config.audio.recordings_path);
    info!("Recognizer endpoint: {}", config.recognizer.endpoint);

    let ledger = Arc::new(TranscriptLedger::open(&config.transcripts.ledger_path)?);

    let recognizer: Arc<dyn RecognizerBackend> = Arc::new(WsRecognizer::new(WsRecognizerConfig {
        endpoint: config.recognizer.endpoint.clone(),
        channel_capacity: config.recognizer.channel_capacity,
    }));

    let hook: Arc<dyn CompletionHook> = match &config.voice_clone {
        Some(clone_config) => {
            info!("Voice-clone hook enabled: {}", clone_config.endpoint);
            Arc::new(VoiceCloneHook::new(clone_config.clone()))
        }
        None => Arc::new(LogHook),
    };

    let state = AppState {
        config: Arc::clone(&config),
        recognizer,
        ledger,
        hook,
    };

    let addr = format!("{}:{}", config.service.http.bind, config.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
