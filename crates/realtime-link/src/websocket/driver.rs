//! Link state machine and its driver task.
//!
//! All state lives in [`LinkCore`] behind one mutex. Consumer calls mutate it
//! synchronously; transport events, timer expiries and auth polls arrive as
//! [`DriverEvent`]s on a single queue that the driver task applies in order.
//! The lock is never held across an await point or while listeners run.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{
    config::LinkConfig,
    listeners::ListenerRegistry,
    protocol::SubscriptionProtocol,
    queue::OutboundQueue,
    subscription::TopicTable,
    transport::{Connector, EventSink, TransportEvent, TransportLink},
    types::{ConnectionEpoch, ConnectionStatus, Topic},
};
use crate::{
    auth::AuthSignal,
    codec::{self, Payload, WsMessage},
    reconnect::{ArmOutcome, ReconnectScheduler},
};

/// Work items processed by the driver task.
#[derive(Debug)]
pub(crate) enum DriverEvent {
    Transport {
        epoch: ConnectionEpoch,
        event: TransportEvent,
    },
    ReconnectDue {
        token: u64,
    },
    UnsubscribeDue {
        topic: Topic,
        token: u64,
    },
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadyState {
    Connecting,
    Open,
    Closing,
}

struct ActiveTransport {
    epoch: ConnectionEpoch,
    link: Box<dyn TransportLink>,
    ready: ReadyState,
}

/// What happened to a payload handed to the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendOutcome {
    /// Written to an open transport.
    Sent,
    /// Buffered for the next open transport.
    Queued { connecting: bool },
    /// Dropped: no session.
    Rejected,
}

impl SendOutcome {
    fn accepted(self) -> bool {
        match self {
            Self::Sent => true,
            Self::Queued { connecting } => connecting,
            Self::Rejected => false,
        }
    }
}

struct LinkState {
    authenticated: bool,
    stopped: bool,
    should_reconnect: bool,
    epoch: ConnectionEpoch,
    transport: Option<ActiveTransport>,
    queue: OutboundQueue,
    reconnect: ReconnectScheduler,
    topics: TopicTable,
}

pub(crate) struct LinkCore {
    config: Arc<LinkConfig>,
    connector: Arc<dyn Connector>,
    auth: Arc<dyn AuthSignal>,
    protocol: Arc<dyn SubscriptionProtocol>,
    runtime: Handle,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    /// Serializes auth polls so results are applied in poll order.
    auth_gate: Mutex<()>,
    state: Mutex<LinkState>,
    listeners: ListenerRegistry,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl LinkCore {
    pub(crate) fn new(
        config: Arc<LinkConfig>,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthSignal>,
        protocol: Arc<dyn SubscriptionProtocol>,
        runtime: Handle,
        events_tx: mpsc::UnboundedSender<DriverEvent>,
    ) -> Self {
        let state = LinkState {
            authenticated: false,
            stopped: false,
            should_reconnect: false,
            epoch: ConnectionEpoch::default(),
            transport: None,
            queue: OutboundQueue::new(config.max_queued_messages),
            reconnect: ReconnectScheduler::new(config.backoff(), config.reconnect_max_attempts),
            topics: TopicTable::new(),
        };
        let (status_tx, _) = watch::channel(ConnectionStatus::Idle);

        Self {
            config,
            connector,
            auth,
            protocol,
            runtime,
            events_tx,
            auth_gate: Mutex::new(()),
            state: Mutex::new(state),
            listeners: ListenerRegistry::new(),
            status_tx,
        }
    }

    pub(crate) fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub(crate) fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn queued_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn reconnect_attempt(&self) -> u32 {
        self.state.lock().reconnect.attempt()
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    pub(crate) fn active_topics(&self) -> Vec<Topic> {
        self.state.lock().topics.active()
    }

    #[cfg(test)]
    fn tracked_topics(&self) -> usize {
        self.state.lock().topics.len()
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            debug!(from = %previous, to = %status, "Connection status changed");
        }
    }

    /// Re-evaluate the auth signal and apply a change.
    pub(crate) fn refresh_auth(&self) {
        let _gate = self.auth_gate.lock();
        let authenticated = self.auth.poll();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.stopped || state.authenticated == authenticated {
            return;
        }
        state.authenticated = authenticated;
        if authenticated {
            info!("Session detected, opening realtime link");
            self.restart_locked(state);
        } else {
            info!("Session ended, tearing down realtime link");
            self.teardown_locked(state);
        }
    }

    pub(crate) fn connect(&self) {
        let mut guard = self.state.lock();
        if guard.stopped {
            return;
        }
        self.restart_locked(&mut guard);
    }

    /// Connect on behalf of the consumer. A spent retry budget starts over.
    fn restart_locked(&self, state: &mut LinkState) {
        if state.reconnect.is_exhausted() {
            debug!(attempts = state.reconnect.attempt(), "Retry budget renewed");
            state.reconnect.reset();
        }
        self.connect_locked(state);
    }

    fn connect_locked(&self, state: &mut LinkState) {
        if !state.authenticated {
            debug!("Connect skipped: no session");
            return;
        }
        if let Some(transport) = &state.transport
            && matches!(transport.ready, ReadyState::Connecting | ReadyState::Open)
        {
            return;
        }

        state.reconnect.cancel();
        state.should_reconnect = true;
        if let Some(mut stale) = state.transport.take() {
            stale.link.close();
        }

        state.epoch = state.epoch.next();
        let epoch = state.epoch;
        info!(url = %self.config.url, epoch = epoch.0, "Opening WebSocket connection");
        let events = EventSink::new(epoch, self.events_tx.clone());
        let link = self.connector.open(&self.config.url, &self.runtime, events);
        state.transport = Some(ActiveTransport {
            epoch,
            link,
            ready: ReadyState::Connecting,
        });
        self.set_status(ConnectionStatus::Connecting);
    }

    fn teardown_locked(&self, state: &mut LinkState) {
        state.should_reconnect = false;
        state.reconnect.cancel();
        state.reconnect.reset();
        if let Some(mut transport) = state.transport.take() {
            transport.link.close();
        }
        let dropped = state.queue.len();
        state.queue.clear();
        state.topics.clear();
        if self.status() != ConnectionStatus::Idle {
            self.set_status(ConnectionStatus::Closed);
        }
        info!(dropped, "Realtime link torn down");
    }

    /// Tear down for good. Later calls are no-ops.
    pub(crate) fn stop(&self) {
        {
            let mut guard = self.state.lock();
            if guard.stopped {
                return;
            }
            self.teardown_locked(&mut guard);
            guard.stopped = true;
            guard.authenticated = false;
        }
        let _ = self.events_tx.send(DriverEvent::Shutdown);
    }

    pub(crate) fn send_message(&self, payload: Payload) -> bool {
        let mut guard = self.state.lock();
        self.send_locked(&mut guard, payload).accepted()
    }

    fn send_locked(&self, state: &mut LinkState, payload: Payload) -> SendOutcome {
        if state.stopped || !state.authenticated {
            warn!("Attempted to send a message without an active session");
            return SendOutcome::Rejected;
        }

        match state.transport.as_ref().map(|t| t.ready) {
            Some(ReadyState::Open) => {
                if let Some(transport) = state.transport.as_mut() {
                    match transport.link.send(codec::encode(&payload)) {
                        Ok(()) => return SendOutcome::Sent,
                        Err(err) => {
                            warn!(
                                error = %err,
                                epoch = transport.epoch.0,
                                "Transport refused frame, queueing and reconnecting"
                            );
                            transport.ready = ReadyState::Closing;
                        }
                    }
                }
                state.queue.push(payload);
                self.restart_locked(state);
                SendOutcome::Queued { connecting: false }
            }
            Some(ReadyState::Connecting) => {
                state.queue.push(payload);
                SendOutcome::Queued { connecting: true }
            }
            None | Some(ReadyState::Closing) => {
                state.queue.push(payload);
                self.restart_locked(state);
                SendOutcome::Queued { connecting: false }
            }
        }
    }

    pub(crate) fn subscribe(&self, topic: Topic) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.stopped || !state.topics.declare(&topic) {
            return;
        }
        debug!(topic = %topic, "Subscribing");
        let intent = self.protocol.build_subscribe(&topic);
        if self.send_locked(state, intent) != SendOutcome::Rejected {
            state.topics.mark_active(&topic);
        }
    }

    pub(crate) fn unsubscribe(&self, topic: Topic) {
        let mut guard = self.state.lock();
        if guard.stopped {
            return;
        }
        let tx = self.events_tx.clone();
        let key = topic.clone();
        guard.topics.retract(
            &topic,
            &self.runtime,
            self.config.unsubscribe_grace,
            move |token| {
                let _ = tx.send(DriverEvent::UnsubscribeDue { topic: key, token });
            },
        );
    }

    fn handle_event(&self, event: DriverEvent) {
        match event {
            DriverEvent::Transport { epoch, event } => match event {
                TransportEvent::Opened => self.on_open(epoch),
                TransportEvent::Message(message) => self.on_message(epoch, message),
                TransportEvent::Error(reason) => self.on_error(epoch, &reason),
                TransportEvent::Closed(reason) => self.on_closed(epoch, reason),
            },
            DriverEvent::ReconnectDue { token } => self.on_reconnect_due(token),
            DriverEvent::UnsubscribeDue { topic, token } => self.on_unsubscribe_due(&topic, token),
            DriverEvent::Shutdown => {}
        }
    }

    fn on_open(&self, epoch: ConnectionEpoch) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(transport) = state.transport.as_mut().filter(|t| t.epoch == epoch) else {
            debug!(epoch = epoch.0, "Ignoring open of a stale transport");
            return;
        };

        transport.ready = ReadyState::Open;
        state.reconnect.reset();
        self.set_status(ConnectionStatus::Open);
        info!(epoch = epoch.0, queued = state.queue.len(), "WebSocket connected");

        let mut failed = 0usize;
        for payload in state.queue.drain() {
            if let Err(err) = transport.link.send(codec::encode(&payload)) {
                failed += 1;
                debug!(error = %err, "Dropping queued message");
            }
        }
        if failed > 0 {
            warn!(failed, epoch = epoch.0, "Queued messages could not be flushed");
        }
    }

    fn on_message(&self, epoch: ConnectionEpoch, message: WsMessage) {
        {
            let state = self.state.lock();
            if state.transport.as_ref().is_none_or(|t| t.epoch != epoch) {
                debug!(epoch = epoch.0, "Ignoring message from a stale transport");
                return;
            }
        }
        let payload = codec::decode(message);
        self.listeners.dispatch(&payload);
    }

    fn on_error(&self, epoch: ConnectionEpoch, reason: &str) {
        let mut state = self.state.lock();
        let Some(transport) = state.transport.as_mut().filter(|t| t.epoch == epoch) else {
            return;
        };
        transport.ready = ReadyState::Closing;
        warn!(epoch = epoch.0, reason, "WebSocket error");
        self.set_status(ConnectionStatus::Error);
    }

    fn on_closed(&self, epoch: ConnectionEpoch, reason: Option<String>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.transport.as_ref().is_none_or(|t| t.epoch != epoch) {
            debug!(epoch = epoch.0, "Ignoring close of a stale transport");
            return;
        }
        state.transport = None;
        self.set_status(ConnectionStatus::Closed);
        info!(epoch = epoch.0, reason = ?reason, "WebSocket closed");

        if state.should_reconnect && state.authenticated {
            self.schedule_reconnect_locked(state);
        }
    }

    fn schedule_reconnect_locked(&self, state: &mut LinkState) {
        let tx = self.events_tx.clone();
        let outcome = state.reconnect.arm(&self.runtime, move |token| {
            let _ = tx.send(DriverEvent::ReconnectDue { token });
        });
        match outcome {
            ArmOutcome::Armed(delay) => info!(
                delay_ms = delay.as_millis() as u64,
                attempt = state.reconnect.attempt() + 1,
                "Scheduling reconnect"
            ),
            ArmOutcome::AlreadyPending => debug!("Reconnect already scheduled"),
            ArmOutcome::Exhausted => error!(
                attempts = state.reconnect.attempt(),
                "Max reconnection attempts exceeded"
            ),
        }
    }

    fn on_reconnect_due(&self, token: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.reconnect.fire(token) {
            return;
        }
        debug!(attempt = state.reconnect.attempt(), "Reconnect timer fired");
        self.connect_locked(state);
    }

    fn on_unsubscribe_due(&self, topic: &Topic, token: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.topics.expire(topic, token) {
            return;
        }
        debug!(topic = %topic, "Unsubscribing");
        let intent = self.protocol.build_unsubscribe(topic);
        self.send_locked(state, intent);
    }
}

/// Apply driver events and poll the auth signal until shutdown.
pub(crate) async fn run_driver(core: Arc<LinkCore>, mut events_rx: mpsc::UnboundedReceiver<DriverEvent>) {
    let period = core.config.auth_poll_interval;
    let mut auth_poll = tokio::time::interval_at(Instant::now() + period, period);
    auth_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            event = events_rx.recv() => match event {
                Some(DriverEvent::Shutdown) | None => break,
                Some(event) => core.handle_event(event),
            },
            _ = auth_poll.tick() => core.refresh_auth(),
        }
    }

    info!("Realtime link driver stopped");
}
