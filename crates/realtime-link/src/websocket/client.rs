//! User-facing realtime link API.
//!
//! The [`RealtimeClient`] is the single shared handle consumers use to send
//! messages, observe inbound traffic, follow the connection status and
//! declare topic interest.

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
};
use tracing::info;

use super::{
    config::LinkConfig,
    driver::{LinkCore, run_driver},
    listeners::{ListenerHandle, MessageHandler},
    protocol::{JsonTopicProtocol, SubscriptionProtocol},
    transport::{Connector, TungsteniteConnector},
    types::{ConnectionStatus, Topic},
};
use crate::{
    auth::AuthSignal,
    codec::Payload,
    error::{LinkError, LinkResult},
};

/// Builder for [`RealtimeClient`].
pub struct RealtimeClientBuilder {
    config: LinkConfig,
    auth: Arc<dyn AuthSignal>,
    connector: Option<Arc<dyn Connector>>,
    protocol: Option<Arc<dyn SubscriptionProtocol>>,
}

impl RealtimeClientBuilder {
    /// Replace the default `tokio-tungstenite` transport.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Like [`RealtimeClientBuilder::connector`] for a shared connector.
    #[must_use]
    pub fn connector_shared(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the default [`JsonTopicProtocol`].
    #[must_use]
    pub fn protocol(mut self, protocol: impl SubscriptionProtocol) -> Self {
        self.protocol = Some(Arc::new(protocol));
        self
    }

    /// Validate the configuration and start the link.
    ///
    /// Must be called from within a Tokio runtime. The auth signal is
    /// evaluated immediately; with a session present the first connection
    /// attempt starts before this returns.
    pub fn start(self) -> LinkResult<RealtimeClient> {
        self.config.validate().map_err(LinkError::config)?;
        let runtime = Handle::try_current()
            .map_err(|_| LinkError::config("RealtimeClient must be started within a Tokio runtime"))?;

        let config = Arc::new(self.config);
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector::new(&config)));
        let protocol = self
            .protocol
            .unwrap_or_else(|| Arc::new(JsonTopicProtocol::default()));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let core = Arc::new(LinkCore::new(
            Arc::clone(&config),
            connector,
            self.auth,
            protocol,
            runtime.clone(),
            events_tx,
        ));

        runtime.spawn(run_driver(Arc::clone(&core), events_rx));
        core.refresh_auth();

        info!(url = %config.url, "Realtime client started");

        Ok(RealtimeClient {
            inner: Arc::new(ClientInner { core }),
        })
    }
}

struct ClientInner {
    core: Arc<LinkCore>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.core.stop();
    }
}

/// Shared handle to one realtime link.
///
/// The client is cheap to clone; every clone drives the same connection.
/// Dropping the last clone stops the link.
///
/// # Example
///
/// ```rust,ignore
/// let jar = Arc::new(CookieJar::from_header("SESSION=abc"));
/// let config = LinkConfig::for_page("https://app.example.com/canvas/3")?;
/// let client = RealtimeClient::builder(config, SessionMarkerSignal::new(jar)).start()?;
///
/// let _handle = client.on_message(|payload| println!("{payload:?}"));
/// client.subscribe("canvas-3");
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl RealtimeClient {
    /// Create a builder. `auth` decides whether a session exists.
    pub fn builder(config: LinkConfig, auth: impl AuthSignal) -> RealtimeClientBuilder {
        RealtimeClientBuilder {
            config,
            auth: Arc::new(auth),
            connector: None,
            protocol: None,
        }
    }

    fn core(&self) -> &LinkCore {
        &self.inner.core
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Send a payload.
    ///
    /// Returns `true` if the payload was written to an open transport or
    /// queued behind a connection attempt already in flight. Returns `false`
    /// if there is no session (the payload is dropped) or if no usable
    /// transport existed (the payload is queued and a connection started).
    pub fn send_message(&self, payload: impl Into<Payload>) -> bool {
        self.core().send_message(payload.into())
    }

    /// Register an inbound message handler.
    pub fn on_message<F>(&self, handler: F) -> ListenerHandle
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.core().listeners().register(Arc::new(handler))
    }

    /// Register a shared handler. The same `Arc` registers only once.
    pub fn on_message_shared(&self, handler: MessageHandler) -> ListenerHandle {
        self.core().listeners().register(handler)
    }

    /// Number of registered message handlers.
    pub fn listener_count(&self) -> usize {
        self.core().listeners().len()
    }

    // ========================================================================
    // Topics
    // ========================================================================

    /// Declare interest in `topic`. Re-declaring an active topic sends nothing.
    pub fn subscribe(&self, topic: impl Into<Topic>) {
        self.core().subscribe(topic.into());
    }

    /// Retract interest in `topic`.
    ///
    /// The unsubscribe intent is sent after the configured grace period
    /// unless the topic is declared again first.
    pub fn unsubscribe(&self, topic: impl Into<Topic>) {
        self.core().unsubscribe(topic.into());
    }

    /// Topics whose subscribe intent is in effect, sorted.
    pub fn active_topics(&self) -> Vec<Topic> {
        self.core().active_topics()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.core().status()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.core().watch_status()
    }

    /// Open a connection if none is open or opening. Idempotent.
    ///
    /// After the reconnect attempt limit was reached this starts a fresh
    /// retry cycle.
    pub fn connect(&self) {
        self.core().connect();
    }

    /// Re-evaluate the auth signal now instead of at the next poll.
    pub fn refresh_auth(&self) {
        self.core().refresh_auth();
    }

    /// Whether the last auth poll saw a session.
    pub fn is_authenticated(&self) -> bool {
        self.core().is_authenticated()
    }

    /// Tear down the link and stop the driver. Idempotent.
    pub fn stop(&self) {
        self.core().stop();
    }

    /// Number of payloads waiting for the next open transport.
    pub fn queued_len(&self) -> usize {
        self.core().queued_len()
    }

    /// Consecutive failed reconnection attempts since the last open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.core().reconnect_attempt()
    }

    /// The configuration the link was started with.
    pub fn config(&self) -> &LinkConfig {
        self.core().config()
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.config().url)
            .field("status", &self.status())
            .finish()
    }
}
