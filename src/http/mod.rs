//! HTTP surface: health check plus the media-stream WebSocket ingress
//!
//! - GET /health - Health check
//! - GET /stream - WebSocket upgrade for one call's media events
//!   (`?CallSid=...&name=...&email=...`)

mod handlers;
mod routes;
mod state;
mod stream;

pub use routes::create_router;
pub use state::AppState;
pub use stream::StreamQuery;
