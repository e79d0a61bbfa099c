//! Session-gated realtime WebSocket link.
//!
//! This module keeps one WebSocket connection alive for as long as an
//! authenticated session exists:
//!
//! - **Session Gating**: Connects when the [`AuthSignal`](crate::auth::AuthSignal)
//!   turns true, tears everything down when it turns false
//! - **Offline Queue**: Messages sent while disconnected are buffered and
//!   flushed in order once the connection opens
//! - **Auto-Reconnection**: Exponential backoff (1s doubling to a 30s cap)
//!   after unexpected closures
//! - **Listener Fan-out**: Every decoded inbound message reaches every
//!   registered handler; a failing handler does not affect the others
//! - **Topic Intents**: Subscribe/unsubscribe messages with a cancellable
//!   grace period, so quick remounts do not churn the server
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  sync calls  ┌────────────┐   open/send   ┌─────────────┐
//! │ RealtimeClient │─────────────▶│  LinkCore  │──────────────▶│  Connector  │
//! │    (Clone)     │              │  (Mutex)   │               │ (transport) │
//! └────────────────┘              └─────▲──────┘               └──────┬──────┘
//!                                       │ DriverEvent                 │
//!                                ┌──────┴──────┐    EventSink         │
//!                                │ driver task │◀─────────────────────┘
//!                                │ + auth poll │◀── reconnect / unsubscribe timers
//!                                └─────────────┘
//! ```
//!
//! Transport events carry the [`ConnectionEpoch`] of the transport that
//! produced them; events of superseded transports are ignored.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use realtime_link::{
//!     auth::{CookieJar, SessionMarkerSignal},
//!     websocket::{LinkConfig, RealtimeClient},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let jar = Arc::new(CookieJar::from_header("SESSION=abc123"));
//!     let config = LinkConfig::for_page("https://app.example.com/canvas/3")?;
//!     let client = RealtimeClient::builder(config, SessionMarkerSignal::new(jar)).start()?;
//!
//!     let _listener = client.on_message(|payload| {
//!         if let Some(name) = payload.field("fileName") {
//!             println!("new file: {name}");
//!         }
//!     });
//!     client.subscribe("canvas-3");
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.stop();
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod driver;
mod listeners;
mod protocol;
mod queue;
mod subscription;
mod transport;
mod types;

pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use config::{DEFAULT_WS_PATH, LinkConfig};
pub use listeners::{ListenerHandle, ListenerRegistry, MessageHandler};
pub use protocol::{DEFAULT_TOPIC_FIELD, JsonTopicProtocol, SubscriptionProtocol};
pub use transport::{Connector, EventSink, TransportEvent, TransportLink, TungsteniteConnector};
pub use types::{ConnectionEpoch, ConnectionStatus, Topic};
