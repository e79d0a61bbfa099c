//! Error handling for the realtime link.
//!
//! Only setup and transport plumbing is fallible. The consumer-facing send
//! path reports acceptance as a `bool` and never returns these errors.

use std::time::Duration;

use thiserror::Error;

/// The main result type used throughout the link.
pub type LinkResult<T> = Result<T, LinkError>;

/// Error type for link setup and transport operations.
#[derive(Error, Debug)]
pub enum LinkError {
    /// WebSocket errors
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// The connection was closed, optionally with a reason.
    #[error("Connection closed{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    ConnectionClosed { reason: Option<String> },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl From<url::ParseError> for LinkError {
    fn from(e: url::ParseError) -> Self {
        Self::Config {
            message: format!("invalid URL: {e}"),
        }
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for LinkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                Self::ConnectionClosed { reason: None }
            }
            other => Self::WebSocket {
                message: other.to_string(),
            },
        }
    }
}

impl LinkError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a connection-closed error.
    pub fn connection_closed(reason: Option<String>) -> Self {
        Self::ConnectionClosed { reason }
    }
}
