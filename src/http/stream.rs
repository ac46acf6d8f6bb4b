//! Media stream ingress
//!
//! The telephony provider connects a WebSocket to `/stream` and sends
//! JSON-framed events: `start`, then `media` events carrying base64
//! mu-law payloads, then `stop`. Nothing is sent back on this channel.
//! Call identity arrives as query parameters and is threaded into the
//! session explicitly.

use super::state::AppState;
use crate::session::{CallerInfo, SessionConfig, StreamSession};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Query parameters on the stream upgrade request.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Telephony call identifier
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    /// Caller name, forwarded to the completion hook
    pub name: Option<String>,
    /// Caller email, forwarded to the completion hook
    pub email: Option<String>,
}

/// Inbound events on the media stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum StreamEvent {
    Start,
    Media { media: MediaPayload },
    Stop,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    /// Base64-encoded mu-law audio bytes
    payload: String,
}

/// GET /stream
/// Upgrade to the duplex media channel for one call
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, state, query))
}

async fn handle_stream(mut socket: WebSocket, state: AppState, query: StreamQuery) {
    let call_id = query
        .call_sid
        .unwrap_or_else(|| format!("call-{}", uuid::Uuid::new_v4()));

    info!("Media stream connected: {}", call_id);

    let mut session: Option<StreamSession> = None;

    loop {
        let msg = match socket.recv().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!("Media stream error for call {}: {}", call_id, e);
                break;
            }
            None => break,
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event = match serde_json::from_str::<StreamEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Unparseable stream event for call {}: {}", call_id, e);
                continue;
            }
        };

        match event {
            StreamEvent::Start => {
                if session.is_some() {
                    warn!("Duplicate start event for call {}", call_id);
                    continue;
                }

                info!("Streaming is starting: {}", call_id);

                let config = SessionConfig {
                    call_id: call_id.clone(),
                    caller: CallerInfo {
                        name: query.name.clone().unwrap_or_default(),
                        email: query.email.clone().unwrap_or_default(),
                    },
                    recordings_dir: PathBuf::from(&state.config.audio.recordings_path),
                    recognition: state.config.recognition_config(),
                    drain_timeout: Duration::from_secs(state.config.recognizer.drain_timeout_secs),
                };

                match StreamSession::open(
                    config,
                    state.recognizer.as_ref(),
                    state.ledger.clone(),
                    state.hook.clone(),
                )
                .await
                {
                    Ok(s) => session = Some(s),
                    Err(e) => {
                        // No archive means nothing this pipeline can
                        // produce for the call; surface and hang up.
                        error!("Failed to open session for call {}: {:#}", call_id, e);
                        break;
                    }
                }
            }

            StreamEvent::Media { media } => match session.as_mut() {
                Some(session) => session.handle_media(&media.payload).await,
                None => warn!("Media event before start for call {}", call_id),
            },

            StreamEvent::Stop => {
                info!("Streaming has stopped: {}", call_id);
                break;
            }
        }
    }

    // Clean stop and remote hangup take the same path: drain, close the
    // archive, fire the hook.
    if let Some(session) = session {
        if let Err(e) = session.finish().await {
            error!("Failed to close session for call {}: {:#}", call_id, e);
        }
    }

    info!("Media stream ended: {}", call_id);
}
