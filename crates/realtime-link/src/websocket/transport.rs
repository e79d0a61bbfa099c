//! Transport seam.
//!
//! A [`Connector`] opens transports without blocking: it returns a
//! [`TransportLink`] immediately and reports progress through the
//! [`EventSink`] it was handed. The driver only ever talks to the transport
//! through these two traits, which keeps the state machine testable with a
//! scripted transport.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::{runtime::Handle, sync::mpsc};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use super::{config::LinkConfig, driver::DriverEvent, types::ConnectionEpoch};
use crate::{
    codec::WsMessage,
    error::{LinkError, LinkResult},
};

/// Lifecycle and data events reported by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport is established and accepts frames.
    Opened,
    /// A data frame arrived.
    Message(WsMessage),
    /// A low-level fault. A `Closed` event is expected to follow.
    Error(String),
    /// The transport is gone, cleanly or not.
    Closed(Option<String>),
}

/// Reports events of one transport instance back to the link.
///
/// Events are tagged with the epoch of the transport they belong to; events
/// of a transport the link has since replaced or torn down are ignored.
#[derive(Clone, Debug)]
pub struct EventSink {
    epoch: ConnectionEpoch,
    tx: mpsc::UnboundedSender<DriverEvent>,
}

impl EventSink {
    pub(crate) fn new(epoch: ConnectionEpoch, tx: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> ConnectionEpoch {
        self.epoch
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, message: WsMessage) {
        self.emit(TransportEvent::Message(message));
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Error(reason.into()));
    }

    pub fn closed(&self, reason: Option<String>) {
        self.emit(TransportEvent::Closed(reason));
    }

    /// Returns true once the link has shut down and no longer listens.
    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(DriverEvent::Transport {
            epoch: self.epoch,
            event,
        });
    }
}

/// Opens transports.
///
/// `open` runs while the link holds its state lock: it must return promptly
/// and must not call back into the client. Progress is reported through
/// `events` only.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str, runtime: &Handle, events: EventSink) -> Box<dyn TransportLink>;
}

/// Write side of an open or opening transport, exclusively owned by the link.
pub trait TransportLink: Send {
    /// Hand a frame to the transport without waiting for the write.
    fn send(&mut self, message: WsMessage) -> LinkResult<()>;

    /// Start closing. Must be safe to call in any state.
    fn close(&mut self);
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Clone, Debug)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
    max_message_size: usize,
}

impl TungsteniteConnector {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            max_message_size: config.max_message_size,
        }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(&LinkConfig::default())
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, runtime: &Handle, events: EventSink) -> Box<dyn TransportLink> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_socket(url.to_string(), self.clone(), out_rx, events));
        Box::new(TungsteniteLink { out_tx })
    }
}

enum Outbound {
    Frame(WsMessage),
    Close,
}

struct TungsteniteLink {
    out_tx: mpsc::UnboundedSender<Outbound>,
}

impl TransportLink for TungsteniteLink {
    fn send(&mut self, message: WsMessage) -> LinkResult<()> {
        self.out_tx
            .send(Outbound::Frame(message))
            .map_err(|_| LinkError::connection_closed(Some("socket task finished".to_string())))
    }

    fn close(&mut self) {
        let _ = self.out_tx.send(Outbound::Close);
    }
}

/// Resolves once the owner asks to close or drops the link.
async fn closed_by_owner(out_rx: &mut mpsc::UnboundedReceiver<Outbound>) {
    loop {
        match out_rx.recv().await {
            Some(Outbound::Close) | None => return,
            Some(Outbound::Frame(_)) => {
                debug!("Discarding frame written before the socket opened");
            }
        }
    }
}

fn to_wire(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data.to_vec()),
    }
}

async fn run_socket(
    url: String,
    settings: TungsteniteConnector,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    let epoch = events.epoch();
    debug!(url = %url, epoch = epoch.0, "Connecting to WebSocket");

    let handshake = tokio::time::timeout(settings.connect_timeout, connect_async(url.as_str()));
    let ws = tokio::select! {
        result = handshake => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(err)) => {
                let err = LinkError::from(err);
                warn!(error = %err, epoch = epoch.0, "Connection failed");
                events.error(err.to_string());
                events.closed(Some(err.to_string()));
                return;
            }
            Err(_) => {
                let err = LinkError::timeout(settings.connect_timeout);
                warn!(error = %err, epoch = epoch.0, "Connection failed");
                events.error(err.to_string());
                events.closed(Some(err.to_string()));
                return;
            }
        },
        _ = closed_by_owner(&mut out_rx) => {
            debug!(epoch = epoch.0, "Connection abandoned before handshake completed");
            events.closed(Some("closed before open".to_string()));
            return;
        }
    };

    info!(epoch = epoch.0, "WebSocket handshake complete");
    events.opened();

    let (mut sink, mut stream) = ws.split();
    let reason = loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Frame(message)) => {
                    if let Err(err) = sink.send(to_wire(message)).await {
                        let err = LinkError::from(err);
                        warn!(error = %err, epoch = epoch.0, "WebSocket write failed");
                        events.error(err.to_string());
                        break Some(err.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break Some("closed by client".to_string());
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if settings.max_message_size > 0 && text.len() > settings.max_message_size {
                        warn!(
                            size = text.len(),
                            max = settings.max_message_size,
                            "Dropping oversized WebSocket message"
                        );
                        continue;
                    }
                    events.message(WsMessage::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    if settings.max_message_size > 0 && data.len() > settings.max_message_size {
                        warn!(
                            size = data.len(),
                            max = settings.max_message_size,
                            "Dropping oversized WebSocket message"
                        );
                        continue;
                    }
                    events.message(WsMessage::Binary(Bytes::from(data)));
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong; flushing writes it out.
                    let _ = sink.flush().await;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| format!("{} {}", f.code, f.reason));
                }
                Some(Err(err)) => {
                    let err = LinkError::from(err);
                    warn!(error = %err, epoch = epoch.0, "WebSocket read error");
                    events.error(err.to_string());
                    break Some(err.to_string());
                }
                None => break None,
            },
        }
    };

    debug!(epoch = epoch.0, reason = ?reason, "WebSocket closed");
    events.closed(reason);
}
