//! Client side of a running controller.

use std::sync::Arc;

use bucket_core::{BucketKey, ConfigUpdate, Decision};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::controller::Request;

/// Errors from talking to a controller. A denied acquire is not one of them.
#[derive(Debug, Error, PartialEq)]
pub enum ControllerError {
    #[error("cost must be a finite non-negative number, got {0}")]
    InvalidCost(f64),
    #[error("controller is no longer running")]
    Closed,
}

/// A cheap, cloneable sender into one controller's queue.
///
/// `acquire` and `inspect` wait for the controller's reply. `adjust_tokens` and
/// `update_configuration` only enqueue and return; because they share the queue,
/// a later `acquire` from the same caller is guaranteed to observe them.
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Request>,
    namespace: Arc<str>,
}

impl ControllerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Request>, namespace: &str) -> Self {
        Self {
            tx,
            namespace: Arc::from(namespace),
        }
    }

    /// The namespace of the controller this handle talks to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Requests `cost` tokens from `key` and waits for the decision.
    pub async fn acquire(
        &self,
        key: impl Into<BucketKey>,
        cost: f64,
    ) -> Result<Decision, ControllerError> {
        if !cost.is_finite() || cost < 0.0 {
            return Err(ControllerError::InvalidCost(cost));
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Acquire {
                key: key.into(),
                cost,
                reply,
            })
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    /// Returns the tokens available for `key` right now (`0` when overdrawn).
    pub async fn inspect(&self, key: impl Into<BucketKey>) -> Result<f64, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Inspect {
                key: key.into(),
                reply,
            })
            .map_err(|_| ControllerError::Closed)?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    /// Enqueues a bypass adjustment of `amount` tokens. Does not wait.
    pub fn adjust_tokens(&self, key: impl Into<BucketKey>, amount: f64) {
        if !amount.is_finite() {
            warn!(amount, "ignoring non-finite token adjustment");
            return;
        }
        let request = Request::Adjust {
            key: key.into(),
            amount,
        };
        if self.tx.send(request).is_err() {
            debug!(namespace = %self.namespace, "controller closed, adjustment dropped");
        }
    }

    /// Enqueues a partial configuration change. Does not wait.
    pub fn update_configuration(&self, update: ConfigUpdate) {
        if self.tx.send(Request::Configure(update)).is_err() {
            debug!(namespace = %self.namespace, "controller closed, configuration update dropped");
        }
    }

    /// Asks the controller to stop after the requests already queued.
    pub fn shutdown(&self) {
        if self.tx.send(Request::Shutdown).is_err() {
            debug!(namespace = %self.namespace, "controller already stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles feed the same controller.
    pub fn same_controller(&self, other: &ControllerHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}
