//! Cancellable one-shot timers.

use std::time::Duration;

use tokio::{runtime::Handle, task::JoinHandle};

/// A spawned one-shot timer identified by a token.
///
/// Aborting the task stops a timer that has not fired yet. A timer whose
/// callback already queued work cannot be recalled, so receivers compare the
/// token they get against the one they still hold.
#[derive(Debug)]
pub(crate) struct Deferred {
    token: u64,
    task: JoinHandle<()>,
}

impl Deferred {
    /// Spawn a timer that calls `on_fire(token)` after `delay`.
    ///
    /// A zero delay fires at the next scheduling opportunity of the runtime.
    pub(crate) fn spawn<F>(runtime: &Handle, token: u64, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let task = runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            on_fire(token);
        });
        Self { token, task }
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    pub(crate) fn cancel(self) {
        self.task.abort();
    }
}
