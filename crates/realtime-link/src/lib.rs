//! # Realtime Link
//!
//! Session-gated realtime WebSocket client for collaborative canvas
//! applications.
//!
//! This crate keeps a single WebSocket connection to the notification
//! endpoint alive while an authenticated session exists, and exposes it to
//! the rest of an application through one cheap-to-clone handle.
//!
//! ## Features
//!
//! - **Session Gating**: Connection lifetime follows a pluggable auth signal
//! - **Offline Queue**: Ordered buffering of messages sent while disconnected
//! - **Auto-Reconnection**: Exponential backoff with an optional attempt limit
//! - **Listener Fan-out**: Panic-isolated delivery to every message handler
//! - **Topic Intents**: Debounced subscribe/unsubscribe messages
//! - **Observability**: Structured logging via `tracing`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realtime_link::{
//!     auth::AuthFlag,
//!     websocket::{LinkConfig, RealtimeClient},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LinkConfig::new("wss://app.example.com/encube-assignment-api/v1/ws");
//!     let client = RealtimeClient::builder(config, AuthFlag::new(true)).start()?;
//!
//!     client.send_message(serde_json::json!({"type": "ping"}));
//!     client.stop();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod codec;
pub mod error;
pub mod reconnect;
mod timer;

#[cfg(feature = "websocket")]
pub mod websocket;

// Re-export commonly used types
pub use auth::{AuthFlag, AuthSignal, CookieJar, FnSignal, SessionMarkerSignal};
pub use codec::{Payload, WsMessage};
pub use error::{LinkError, LinkResult};
pub use reconnect::BackoffConfig;
#[cfg(feature = "websocket")]
pub use websocket::{ConnectionStatus, LinkConfig, RealtimeClient, Topic};
