#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use realtime_link::{
    codec::WsMessage,
    error::{LinkError, LinkResult},
    websocket::{Connector, EventSink, TransportLink},
};
use serde_json::Value;
use tokio::{runtime::Handle, time::Instant};

/// How freshly opened mock transports behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockMode {
    /// Stay connecting until the test drives them.
    Manual,
    /// Report open right away.
    AutoOpen,
    /// Fail with an error followed by a close.
    Refuse,
}

/// Server end of one mock transport.
#[derive(Clone)]
pub struct MockRemote {
    pub url: String,
    pub opened_at: Instant,
    events: EventSink,
    sent: Arc<Mutex<Vec<WsMessage>>>,
    closed_by_client: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl MockRemote {
    pub fn open(&self) {
        self.events.opened();
    }

    pub fn push_text(&self, text: &str) {
        self.events.message(WsMessage::text(text));
    }

    pub fn push(&self, message: WsMessage) {
        self.events.message(message);
    }

    pub fn fail(&self, reason: &str) {
        self.events.error(reason);
    }

    pub fn close(&self, reason: Option<&str>) {
        self.events.closed(reason.map(str::to_string));
    }

    /// Make every later client write fail.
    pub fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<WsMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| m.as_text().map(str::to_string))
            .collect()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent_texts()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub fn was_closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

struct MockLink {
    sent: Arc<Mutex<Vec<WsMessage>>>,
    closed_by_client: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl TransportLink for MockLink {
    fn send(&mut self, message: WsMessage) -> LinkResult<()> {
        if self.broken.load(Ordering::SeqCst) || self.closed_by_client.load(Ordering::SeqCst) {
            return Err(LinkError::connection_closed(Some("mock transport broken".into())));
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn close(&mut self) {
        self.closed_by_client.store(true, Ordering::SeqCst);
    }
}

/// Scripted [`Connector`] recording every transport it opens.
#[derive(Clone)]
pub struct MockConnector {
    mode: Arc<Mutex<MockMode>>,
    remotes: Arc<Mutex<Vec<MockRemote>>>,
}

impl MockConnector {
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            remotes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_mode(&self, mode: MockMode) {
        *self.mode.lock() = mode;
    }

    pub fn connections(&self) -> usize {
        self.remotes.lock().len()
    }

    pub fn remote(&self, index: usize) -> MockRemote {
        self.remotes.lock()[index].clone()
    }

    pub fn last(&self) -> MockRemote {
        self.remotes
            .lock()
            .last()
            .cloned()
            .expect("no transport opened yet")
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.remotes.lock().iter().map(|r| r.opened_at).collect()
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str, _runtime: &Handle, events: EventSink) -> Box<dyn TransportLink> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed_by_client = Arc::new(AtomicBool::new(false));
        let broken = Arc::new(AtomicBool::new(false));

        match *self.mode.lock() {
            MockMode::Manual => {}
            MockMode::AutoOpen => events.opened(),
            MockMode::Refuse => {
                events.error("connection refused");
                events.closed(Some("connection refused".to_string()));
            }
        }

        self.remotes.lock().push(MockRemote {
            url: url.to_string(),
            opened_at: Instant::now(),
            events,
            sent: Arc::clone(&sent),
            closed_by_client: Arc::clone(&closed_by_client),
            broken: Arc::clone(&broken),
        });

        Box::new(MockLink {
            sent,
            closed_by_client,
            broken,
        })
    }
}

/// Let every ready task run. With a paused clock this also advances time by
/// one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
