//! The single-writer admission controller.
//!
//! A [`Controller`] owns its configuration and bucket table outright. Once spawned,
//! it drains one FIFO queue of [`Request`]s on a single task, so every operation
//! sees the effects of everything enqueued before it and the table never needs a
//! lock.

use std::ops::ControlFlow;
use std::sync::Arc;

use bucket_core::{
    BucketKey, BucketTable, Clock, ConfigError, ConfigUpdate, Configuration, Decision, accumulate,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::handle::ControllerHandle;

/// A message on the controller's queue.
#[derive(Debug)]
pub enum Request {
    /// Decide admission and reply with the outcome.
    Acquire {
        key: BucketKey,
        cost: f64,
        reply: oneshot::Sender<Decision>,
    },
    /// Reply with the balance available now.
    Inspect {
        key: BucketKey,
        reply: oneshot::Sender<f64>,
    },
    /// Add a signed amount, bypassing the admission check and the cap.
    Adjust { key: BucketKey, amount: f64 },
    /// Replace any subset of the configuration.
    Configure(ConfigUpdate),
    /// Stop processing; requests queued behind this one are dropped.
    Shutdown,
}

/// Accounting state and decision logic for one instance.
pub struct Controller {
    config: Configuration,
    table: BucketTable,
    clock: Arc<dyn Clock>,
}

impl Controller {
    /// Creates a controller with an empty table.
    ///
    /// # Arguments
    /// * `config` - A validated configuration.
    /// * `clock` - The time source used for refill and commit timestamps.
    pub fn new(config: Configuration, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            table: BucketTable::new(),
            clock,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn table(&self) -> &BucketTable {
        &self.table
    }

    /// Charges `cost` tokens against `key`.
    ///
    /// The first touch of a bucket is always admitted, even when `cost` exceeds the
    /// capacity: the bucket starts at `max_accumulated - cost`. After that a request
    /// is denied when the refilled balance cannot cover it, and a denial commits
    /// nothing, so the elapsed-time credit is kept for the next attempt.
    pub fn acquire(&mut self, key: BucketKey, cost: f64) -> Decision {
        let now = self.clock.now_ms();

        let Some(state) = self.table.lookup(&key) else {
            let tokens = self.config.max_accumulated - cost;
            trace!(key = %key, cost, tokens, "first touch");
            self.table.insert(key, tokens, now);
            return Decision::Allow(tokens);
        };

        let available = accumulate(state.tokens, now, state.last_update, &self.config);
        let remaining = available - cost;
        if remaining < 0.0 {
            debug!(key = %key, cost, available, "acquire denied");
            return Decision::Deny;
        }

        self.table.update_in_place(&key, remaining, now);
        trace!(key = %key, cost, tokens = remaining, "acquire allowed");
        Decision::Allow(remaining)
    }

    /// Returns the balance available now.
    ///
    /// This is an acquire of cost zero: it commits the refilled balance and bumps
    /// the timestamp. An overdrawn bucket reports `0`.
    pub fn inspect(&mut self, key: BucketKey) -> f64 {
        match self.acquire(key, 0.0) {
            Decision::Allow(tokens) => tokens,
            Decision::Deny => 0.0,
        }
    }

    /// Adds `amount` (possibly negative) to the refilled balance without admission
    /// checks. The result is not clamped to `[0, max_accumulated]`.
    pub fn adjust_tokens(&mut self, key: BucketKey, amount: f64) {
        let now = self.clock.now_ms();
        match self.table.lookup(&key) {
            None => {
                let tokens = self.config.max_accumulated + amount;
                debug!(key = %key, amount, tokens, "adjusted new bucket");
                self.table.insert(key, tokens, now);
            }
            Some(state) => {
                let tokens =
                    accumulate(state.tokens, now, state.last_update, &self.config) + amount;
                debug!(key = %key, amount, tokens, "adjusted bucket");
                self.table.update_in_place(&key, tokens, now);
            }
        }
    }

    /// Applies a partial configuration. Stored balances are left alone; the new
    /// values take effect from the next refill computation.
    pub fn update_configuration(&mut self, update: &ConfigUpdate) -> Result<(), ConfigError> {
        self.config.apply(update)?;
        info!(
            namespace = %self.config.namespace,
            max_accumulated = self.config.max_accumulated,
            refill = self.config.refill,
            interval_ms = self.config.interval_ms,
            "configuration updated"
        );
        Ok(())
    }

    fn handle(&mut self, request: Request) -> ControlFlow<()> {
        match request {
            Request::Acquire { key, cost, reply } => {
                let decision = self.acquire(key, cost);
                if reply.send(decision).is_err() {
                    trace!("acquire caller went away before the reply");
                }
            }
            Request::Inspect { key, reply } => {
                let tokens = self.inspect(key);
                if reply.send(tokens).is_err() {
                    trace!("inspect caller went away before the reply");
                }
            }
            Request::Adjust { key, amount } => self.adjust_tokens(key, amount),
            Request::Configure(update) => {
                if let Err(e) = self.update_configuration(&update) {
                    warn!(error = %e, ?update, "dropping configuration update");
                }
            }
            Request::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Processes requests one at a time until shutdown or until every handle is
    /// dropped.
    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        info!(namespace = %self.config.namespace, "controller started");
        while let Some(request) = requests.recv().await {
            if self.handle(request).is_break() {
                break;
            }
        }
        info!(
            namespace = %self.config.namespace,
            buckets = self.table.len(),
            "controller stopped"
        );
    }

    /// Moves the controller onto its own task and returns the handle that feeds it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ControllerHandle::new(tx, &self.config.namespace);
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::ManualClock;

    fn controller(max: f64, refill: f64, interval_ms: f64) -> (Controller, Arc<ManualClock>) {
        let config = Configuration::builder()
            .namespace("test")
            .max_accumulated(max)
            .refill(refill)
            .interval_ms(interval_ms)
            .build()
            .expect("Config should build");
        let clock = Arc::new(ManualClock::new(1_000));
        (Controller::new(config, clock.clone()), clock)
    }

    fn stored(c: &Controller, key: &BucketKey) -> f64 {
        c.table().lookup(key).expect("Bucket should exist").tokens
    }

    #[test]
    fn test_fresh_bucket_drains_exactly_max() {
        let (mut c, _clock) = controller(5.0, 1.0, 1000.0);
        let key = BucketKey::Int(1);

        for expected in [4.0, 3.0, 2.0, 1.0, 0.0] {
            assert_eq!(c.acquire(key.clone(), 1.0), Decision::Allow(expected));
        }
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Deny);
        assert_eq!(stored(&c, &key), 0.0);
    }

    #[test]
    fn test_deny_keeps_timestamp() {
        let (mut c, clock) = controller(1.0, 1.0, 100.0);
        let key = BucketKey::from("k");

        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Allow(0.0));
        let before = c.table().lookup(&key).unwrap();

        clock.advance(50);
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Deny);
        assert_eq!(c.table().lookup(&key).unwrap(), before);
        // Still denied with no further time passing.
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Deny);

        // The 50ms credit from the denied attempts was not thrown away.
        clock.advance(50);
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Allow(0.0));
    }

    #[test]
    fn test_refill_after_interval() {
        let (mut c, clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::tag("scenario");

        for expected in [3.0, 2.0, 1.0, 0.0] {
            assert_eq!(c.acquire(key.clone(), 1.0), Decision::Allow(expected));
        }
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Deny);

        clock.advance(10);
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Allow(0.0));
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Deny);
    }

    #[test]
    fn test_refill_is_capped() {
        let (mut c, clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(9);
        c.acquire(key.clone(), 4.0);

        clock.advance(10_000);
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Allow(3.0));
    }

    #[test]
    fn test_first_touch_is_never_denied() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(7);

        // An oversized first request is admitted and leaves the bucket overdrawn.
        assert_eq!(c.acquire(key.clone(), 6.0), Decision::Allow(-2.0));
        assert_eq!(stored(&c, &key), -2.0);

        // The same request against the now-present bucket is denied.
        assert_eq!(c.acquire(key.clone(), 6.0), Decision::Deny);
        assert_eq!(c.acquire(key.clone(), 0.0), Decision::Deny);
    }

    #[test]
    fn test_inspect_matches_last_allow() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::from("user");

        c.acquire(key.clone(), 1.0);
        let last = c.acquire(key.clone(), 1.5);
        assert_eq!(last, Decision::Allow(1.5));
        assert_eq!(c.inspect(key), 1.5);
    }

    #[test]
    fn test_inspect_on_absent_key_reports_full_and_materializes() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(3);

        assert_eq!(c.inspect(key.clone()), 4.0);
        assert_eq!(stored(&c, &key), 4.0);
    }

    #[test]
    fn test_inspect_commits_refill_and_timestamp() {
        let (mut c, clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(3);
        c.acquire(key.clone(), 4.0);

        clock.advance(15);
        assert_eq!(c.inspect(key.clone()), 1.5);
        let state = c.table().lookup(&key).unwrap();
        assert_eq!(state.tokens, 1.5);
        assert_eq!(state.last_update, clock.now_ms());
    }

    #[test]
    fn test_inspect_collapses_overdraft_to_zero() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(3);
        c.adjust_tokens(key.clone(), -10.0);

        assert_eq!(c.inspect(key.clone()), 0.0);
        // The overdraft itself is untouched.
        assert_eq!(stored(&c, &key), -6.0);
    }

    #[test]
    fn test_adjust_fresh_bucket() {
        let (mut c, clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(11);

        c.adjust_tokens(key.clone(), -2.0);
        assert_eq!(stored(&c, &key), 2.0);

        clock.advance(1);
        let available = c.inspect(key);
        assert!((2.0..=4.0).contains(&available));
        assert_eq!(available, 2.1);
    }

    #[test]
    fn test_adjust_round_trip_restores_balance() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(12);
        c.acquire(key.clone(), 1.0);

        c.adjust_tokens(key.clone(), 2.5);
        c.adjust_tokens(key.clone(), -2.5);
        assert_eq!(stored(&c, &key), 3.0);
    }

    #[test]
    fn test_adjust_can_exceed_cap() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(13);
        c.acquire(key.clone(), 0.0);

        c.adjust_tokens(key.clone(), 10.0);
        assert_eq!(stored(&c, &key), 14.0);
        // The next refill computation pulls it back under the cap.
        assert_eq!(c.acquire(key.clone(), 1.0), Decision::Allow(3.0));
    }

    #[test]
    fn test_update_configuration_applies_immediately() {
        let (mut c, clock) = controller(4.0, 1.0, 10.0);
        let key = BucketKey::Int(20);
        c.acquire(key.clone(), 4.0);

        c.update_configuration(&ConfigUpdate {
            max_accumulated: Some(10.0),
            refill: Some(2.0),
            interval_ms: Some(5.0),
        })
        .expect("Update should apply");

        // Stored balance is untouched by the update itself.
        assert_eq!(stored(&c, &key), 0.0);

        // 20ms at 2 tokens per 5ms is 8 tokens, under the new cap of 10.
        clock.advance(20);
        assert_eq!(c.acquire(key.clone(), 0.0), Decision::Allow(8.0));

        // Fresh buckets start at the new capacity.
        assert_eq!(c.acquire(BucketKey::Int(21), 1.0), Decision::Allow(9.0));
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        let result = c.update_configuration(&ConfigUpdate {
            interval_ms: Some(0.0),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(c.config().interval_ms, 10.0);
    }

    #[test]
    fn test_handle_stops_on_shutdown() {
        let (mut c, _clock) = controller(4.0, 1.0, 10.0);
        assert!(
            c.handle(Request::Adjust {
                key: BucketKey::Int(1),
                amount: 1.0
            })
            .is_continue()
        );
        assert!(c.handle(Request::Shutdown).is_break());
    }
}
