//! Reconnect backoff and the single-timer reconnect scheduler.

use std::time::Duration;

use rand::Rng;
use tokio::runtime::Handle;

use crate::timer::Deferred;

/// Reconnect/backoff configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("Initial reconnect delay must be > 0".to_string());
        }
        if self.max_delay.is_zero() {
            return Err("Max reconnect delay must be > 0".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("Max reconnect delay must be >= initial reconnect delay".to_string());
        }
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err("Backoff factor must be >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) || !self.jitter.is_finite() {
            return Err("Jitter must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

/// Delay before reconnect attempt number `attempt` (zero based):
/// `min(max_delay, initial_delay * factor^attempt)`, optionally blended with
/// a random value below it.
pub fn calculate_backoff(config: BackoffConfig, attempt: u32) -> Duration {
    let initial = config.initial_delay.as_secs_f64();
    let max = config.max_delay.as_secs_f64();
    let exponent = config.factor.powf(f64::from(attempt));
    let base = (initial * exponent).min(max);

    if config.jitter == 0.0 {
        return Duration::from_secs_f64(base);
    }

    let mut rng = rand::rng();
    let randomized = rng.random_range(0.0..=base);
    let blended = base * (1.0 - config.jitter) + randomized * config.jitter;
    Duration::from_secs_f64(blended)
}

/// Result of asking the scheduler for a retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArmOutcome {
    /// A timer was armed and will fire after the delay.
    Armed(Duration),
    /// A timer is already outstanding; nothing changed.
    AlreadyPending,
    /// The configured attempt limit has been reached.
    Exhausted,
}

/// Owns the reconnect attempt counter and at most one outstanding timer.
#[derive(Debug)]
pub(crate) struct ReconnectScheduler {
    backoff: BackoffConfig,
    max_attempts: Option<u32>,
    attempt: u32,
    next_token: u64,
    pending: Option<Deferred>,
}

impl ReconnectScheduler {
    pub(crate) fn new(backoff: BackoffConfig, max_attempts: Option<u32>) -> Self {
        Self {
            backoff,
            max_attempts,
            attempt: 0,
            next_token: 0,
            pending: None,
        }
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Reset the attempt counter after a successful open.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    /// The attempt limit has been reached; no further retry will be armed.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.max_attempts.is_some_and(|max| self.attempt >= max)
    }

    /// Arm a reconnect timer unless one is already outstanding.
    pub(crate) fn arm<F>(&mut self, runtime: &Handle, on_fire: F) -> ArmOutcome
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if self.pending.is_some() {
            return ArmOutcome::AlreadyPending;
        }
        if self.is_exhausted() {
            return ArmOutcome::Exhausted;
        }

        let delay = calculate_backoff(self.backoff, self.attempt);
        self.next_token = self.next_token.wrapping_add(1);
        self.pending = Some(Deferred::spawn(runtime, self.next_token, delay, on_fire));
        ArmOutcome::Armed(delay)
    }

    /// Accept a fired timer. Returns `false` for a timer that was cancelled
    /// or superseded; otherwise clears the pending marker and counts the
    /// attempt.
    pub(crate) fn fire(&mut self, token: u64) -> bool {
        match &self.pending {
            Some(timer) if timer.token() == token => {
                self.pending = None;
                self.attempt = self.attempt.saturating_add(1);
                true
            }
            _ => false,
        }
    }

    /// Cancel the outstanding timer, if any.
    pub(crate) fn cancel(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let config = BackoffConfig::default();
        let delays: Vec<u128> = (0..8)
            .map(|attempt| calculate_backoff(config, attempt).as_millis())
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn backoff_survives_huge_attempts() {
        let config = BackoffConfig::default();
        assert_eq!(
            calculate_backoff(config, u32::MAX),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn jittered_backoff_stays_within_cap() {
        let config = BackoffConfig {
            jitter: 1.0,
            ..BackoffConfig::default()
        };
        for attempt in 0..10 {
            let delay = calculate_backoff(config, attempt);
            assert!(delay <= Duration::from_secs(30));
        }
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = BackoffConfig {
            factor: 0.5,
            ..BackoffConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "Backoff factor must be >= 1.0"
        );

        let config = BackoffConfig {
            max_delay: Duration::from_millis(10),
            ..BackoffConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "Max reconnect delay must be >= initial reconnect delay"
        );

        assert!(BackoffConfig::default().validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_arms_once_and_counts_fired_attempts() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = ReconnectScheduler::new(BackoffConfig::default(), None);

        let sink = Arc::clone(&fired);
        let outcome = scheduler.arm(&Handle::current(), move |t| sink.lock().unwrap().push(t));
        assert_eq!(outcome, ArmOutcome::Armed(Duration::from_secs(1)));
        assert!(scheduler.is_pending());

        let outcome = scheduler.arm(&Handle::current(), |_| {});
        assert_eq!(outcome, ArmOutcome::AlreadyPending);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        let token = fired.lock().unwrap()[0];
        assert!(scheduler.fire(token));
        assert!(!scheduler.is_pending());
        assert_eq!(scheduler.attempt(), 1);

        // A stale token is ignored.
        assert!(!scheduler.fire(token));
        assert_eq!(scheduler.attempt(), 1);

        let outcome = scheduler.arm(&Handle::current(), |_| {});
        assert_eq!(outcome, ArmOutcome::Armed(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_prevents_firing() {
        let fired = Arc::new(Mutex::new(Vec::<u64>::new()));
        let mut scheduler = ReconnectScheduler::new(BackoffConfig::default(), None);

        let sink = Arc::clone(&fired);
        scheduler.arm(&Handle::current(), move |t| sink.lock().unwrap().push(t));
        scheduler.cancel();
        scheduler.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_respects_attempt_limit() {
        let mut scheduler = ReconnectScheduler::new(BackoffConfig::default(), Some(1));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let first = tx.clone();
        assert!(matches!(
            scheduler.arm(&Handle::current(), move |t| {
                let _ = first.send(t);
            }),
            ArmOutcome::Armed(_)
        ));
        let token = rx.recv().await.expect("timer fired");
        assert!(scheduler.fire(token));

        assert_eq!(
            scheduler.arm(&Handle::current(), move |t| {
                let _ = tx.send(t);
            }),
            ArmOutcome::Exhausted
        );
        assert!(scheduler.is_exhausted());

        scheduler.reset();
        assert_eq!(scheduler.attempt(), 0);
        assert!(!scheduler.is_exhausted());
    }
}
