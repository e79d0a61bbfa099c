//! Inbound message observers.
//!
//! Each delivery runs every registered handler against a snapshot of the
//! set, outside any lock, so handlers may register, dispose, or send from
//! inside a callback. A panicking handler is contained and logged; the
//! remaining handlers still receive the message.

use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::warn;

use crate::codec::Payload;

/// Callback invoked with every decoded inbound payload.
pub type MessageHandler = Arc<dyn Fn(&Payload) + Send + Sync>;

#[derive(Default)]
struct Entries {
    next_id: u64,
    handlers: BTreeMap<u64, MessageHandler>,
}

/// Set of inbound message handlers.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    ///
    /// Registering the same `Arc` twice keeps a single entry.
    pub fn register(&self, handler: MessageHandler) -> ListenerHandle {
        let mut entries = self.entries.lock();
        let existing = entries
            .handlers
            .iter()
            .find(|(_, h)| Arc::ptr_eq(h, &handler))
            .map(|(id, _)| *id);

        let id = match existing {
            Some(id) => id,
            None => {
                entries.next_id += 1;
                let id = entries.next_id;
                entries.handlers.insert(id, handler);
                id
            }
        };

        ListenerHandle {
            id,
            entries: Arc::downgrade(&self.entries),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `payload` to every handler registered at call time.
    pub fn dispatch(&self, payload: &Payload) {
        let snapshot: Vec<MessageHandler> =
            self.entries.lock().handlers.values().cloned().collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                warn!("Message listener panicked; continuing with remaining listeners");
            }
        }
    }
}

/// Disposable registration returned by [`ListenerRegistry::register`].
///
/// Dropping the handle does not unregister; call [`ListenerHandle::dispose`].
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    entries: Weak<Mutex<Entries>>,
    disposed: AtomicBool,
}

impl ListenerHandle {
    /// Remove the registration. Calling this more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(entries) = self.entries.upgrade() {
            entries.lock().handlers.remove(&self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
