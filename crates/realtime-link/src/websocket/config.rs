//! Realtime link configuration.

use std::time::Duration;

use url::Url;

use crate::{
    error::{LinkError, LinkResult},
    reconnect::BackoffConfig,
};

/// Path of the notification endpoint relative to the page host.
pub const DEFAULT_WS_PATH: &str = "/encube-assignment-api/v1/ws";

/// Configuration for the realtime link.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    // URL
    /// WebSocket endpoint URL.
    pub url: String,

    // Reconnection settings
    /// Delay before the first reconnection attempt.
    pub reconnect_initial_delay: Duration,
    /// Cap on the delay between reconnection attempts.
    pub reconnect_max_delay: Duration,
    /// Backoff multiplier for reconnection delays.
    pub reconnect_backoff_factor: f64,
    /// Random jitter factor (0.0-1.0) for reconnection delays.
    pub reconnect_jitter: f64,
    /// Maximum number of consecutive reconnection attempts (None = infinite).
    pub reconnect_max_attempts: Option<u32>,

    // Session
    /// How often the auth signal is polled.
    pub auth_poll_interval: Duration,

    // Topics
    /// Delay before a retracted topic is unsubscribed on the wire.
    /// Zero defers to the next scheduling tick.
    pub unsubscribe_grace: Duration,

    // Connection
    /// Timeout for the transport handshake.
    pub connect_timeout: Duration,
    /// Maximum number of messages buffered while disconnected.
    pub max_queued_messages: usize,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            url: String::new(),
            reconnect_initial_delay: backoff.initial_delay,
            reconnect_max_delay: backoff.max_delay,
            reconnect_backoff_factor: backoff.factor,
            reconnect_jitter: backoff.jitter,
            reconnect_max_attempts: None,
            auth_poll_interval: Duration::from_secs(5),
            unsubscribe_grace: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            max_queued_messages: 1024,
            max_message_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Derive the endpoint from the URL of the hosting page.
    ///
    /// The endpoint lives on the same host as the page at [`DEFAULT_WS_PATH`];
    /// `https` pages use `wss`, everything else uses `ws`.
    pub fn for_page(page_url: &str) -> LinkResult<Self> {
        Self::for_page_with_path(page_url, DEFAULT_WS_PATH)
    }

    /// Like [`LinkConfig::for_page`] with a custom endpoint path.
    pub fn for_page_with_path(page_url: &str, path: &str) -> LinkResult<Self> {
        let page = Url::parse(page_url)?;
        let host = page
            .host_str()
            .ok_or_else(|| LinkError::config(format!("page URL has no host: {page_url}")))?;
        let scheme = if page.scheme() == "https" { "wss" } else { "ws" };
        let authority = match page.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Ok(Self::new(format!("{scheme}://{authority}{path}")))
    }

    /// Set the reconnection initial delay.
    #[must_use]
    pub fn reconnect_initial_delay(mut self, delay: Duration) -> Self {
        self.reconnect_initial_delay = delay;
        self
    }

    /// Set the maximum reconnection delay.
    #[must_use]
    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = delay;
        self
    }

    /// Set the reconnection backoff factor.
    #[must_use]
    pub fn reconnect_backoff_factor(mut self, factor: f64) -> Self {
        self.reconnect_backoff_factor = factor;
        self
    }

    /// Set the reconnection jitter factor.
    #[must_use]
    pub fn reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Set the maximum reconnection attempts.
    #[must_use]
    pub fn reconnect_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.reconnect_max_attempts = attempts;
        self
    }

    /// Set the auth poll interval.
    #[must_use]
    pub fn auth_poll_interval(mut self, interval: Duration) -> Self {
        self.auth_poll_interval = interval;
        self
    }

    /// Set the unsubscribe grace period.
    #[must_use]
    pub fn unsubscribe_grace(mut self, grace: Duration) -> Self {
        self.unsubscribe_grace = grace;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the outbound queue capacity.
    #[must_use]
    pub fn max_queued_messages(mut self, max: usize) -> Self {
        self.max_queued_messages = max;
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Backoff parameters of this configuration.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.reconnect_initial_delay,
            max_delay: self.reconnect_max_delay,
            factor: self.reconnect_backoff_factor,
            jitter: self.reconnect_jitter,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        let url = Url::parse(&self.url).map_err(|e| format!("Invalid URL: {e}"))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(format!("Unsupported URL scheme: {}", url.scheme()));
        }
        self.backoff().validate()?;
        if self.auth_poll_interval.is_zero() {
            return Err("Auth poll interval must be > 0".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.max_queued_messages == 0 {
            return Err("Max queued messages must be > 0".to_string());
        }
        if cfg!(not(feature = "tls")) && url.scheme() == "wss" {
            return Err("wss requires the tls feature".to_string());
        }
        Ok(())
    }
}
