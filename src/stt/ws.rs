//! WebSocket streaming recognizer client
//!
//! Speaks a simple duplex protocol: one JSON `start` message declaring
//! the audio format, then raw binary mu-law frames, then a JSON `stop`
//! marker. The server replies with JSON result messages carrying a
//! transcript and a finality flag, and closes the socket once the last
//! pending result has been flushed.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    FailureHandle, RecognitionConfig, RecognizerBackend, RecognizerError, RecognizerStream,
    StreamEndpoints, TranscriptResult,
};

/// Configuration for the WebSocket recognizer backend.
#[derive(Debug, Clone)]
pub struct WsRecognizerConfig {
    /// WebSocket endpoint of the recognizer, e.g. "ws://localhost:9000/v1/recognize"
    pub endpoint: String,
    /// Bound on in-flight frames before `send` suspends the caller
    pub channel_capacity: usize,
}

impl Default for WsRecognizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:9000/v1/recognize".to_string(),
            channel_capacity: 64,
        }
    }
}

/// Streaming recognizer backed by a WebSocket transport.
pub struct WsRecognizer {
    config: WsRecognizerConfig,
}

impl WsRecognizer {
    pub fn new(config: WsRecognizerConfig) -> Self {
        Self { config }
    }
}

/// Messages received from the recognizer.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Result { transcript: String, is_final: bool },
    Error { message: String },
}

#[async_trait]
impl RecognizerBackend for WsRecognizer {
    async fn start(&self, config: RecognitionConfig) -> Result<RecognizerStream, RecognizerError> {
        Url::parse(&self.config.endpoint)
            .map_err(|e| RecognizerError::BackendUnavailable(format!("invalid endpoint: {e}")))?;

        let (ws, _) = tokio_tungstenite::connect_async(self.config.endpoint.as_str())
            .await
            .map_err(|e| RecognizerError::BackendUnavailable(e.to_string()))?;

        info!("Recognizer stream opened: {}", self.config.endpoint);

        let (mut sink, source) = ws.split();

        // Declare the audio format before any frame is forwarded.
        let start = serde_json::json!({
            "action": "start",
            "encoding": "mulaw",
            "sample_rate": config.sample_rate,
            "language": config.language,
            "interim_results": config.interim_results,
            "punctuate": config.punctuation,
        });
        sink.send(Message::Text(start.to_string()))
            .await
            .map_err(|e| RecognizerError::BackendUnavailable(e.to_string()))?;

        let (stream, endpoints) = RecognizerStream::channel(self.config.channel_capacity);

        tokio::spawn(run_stream(sink, source, endpoints));

        Ok(stream)
    }

    fn name(&self) -> &str {
        "ws-recognizer"
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;
type WsSource = futures::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
>;

/// Drive one recognition stream to completion.
///
/// Frames and results are multiplexed until the session stops sending;
/// after the stop marker goes out, the task keeps draining results until
/// the server closes, so the last finalized segment is never lost.
/// Dropping `results_tx` is what ends the session's result sequence.
async fn run_stream(mut sink: WsSink, mut source: WsSource, endpoints: StreamEndpoints) {
    let StreamEndpoints {
        mut audio_rx,
        results_tx,
        failure,
    } = endpoints;

    let mut stopping = false;

    loop {
        tokio::select! {
            frame = audio_rx.recv(), if !stopping => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Binary(frame.to_vec())).await {
                        warn!("Recognizer send failed: {}", e);
                        failure.set(RecognizerError::Transport(e.to_string()));
                        return;
                    }
                }
                None => {
                    // No more frames; ask the server to flush pending results.
                    if let Err(e) = sink.send(Message::Text(r#"{"action":"stop"}"#.to_string())).await {
                        warn!("Recognizer stop marker failed: {}", e);
                        failure.set(RecognizerError::Transport(e.to_string()));
                        return;
                    }
                    stopping = true;
                }
            },
            msg = source.next() => {
                if !handle_server_message(msg, &results_tx, &failure).await {
                    return;
                }
            }
        }
    }
}

/// Process one inbound transport message. Returns false once the result
/// sequence is over.
async fn handle_server_message(
    msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    results_tx: &tokio::sync::mpsc::Sender<TranscriptResult>,
    failure: &FailureHandle,
) -> bool {
    match msg {
        Some(Ok(Message::Text(text))) => {
            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(ServerMessage::Result {
                    transcript,
                    is_final,
                }) => {
                    let result = TranscriptResult {
                        text: transcript,
                        is_final,
                    };
                    if results_tx.send(result).await.is_err() {
                        // Session gave up draining; nothing left to do.
                        return false;
                    }
                }
                Ok(ServerMessage::Error { message }) => {
                    warn!("Recognizer reported error: {}", message);
                    failure.set(RecognizerError::Transport(message));
                    return false;
                }
                Err(e) => {
                    warn!("Unparseable recognizer message: {} - raw: {}", e, text);
                }
            }
            true
        }
        Some(Ok(Message::Close(_))) | None => {
            debug!("Recognizer closed the stream");
            false
        }
        Some(Ok(_)) => true, // ping/pong/binary: nothing to do
        Some(Err(e)) => {
            warn!("Recognizer transport error: {}", e);
            failure.set(RecognizerError::Transport(e.to_string()));
            false
        }
    }
}
