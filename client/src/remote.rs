//! HTTP client for a remote controller.

use bucket_core::{AcquireReply, BucketKey, ConfigUpdate, Decision, InspectReply};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Client for a controller's HTTP front-end.
///
/// Uses blocking requests (`reqwest::blocking`); call it from a plain thread or
/// through `spawn_blocking`.
pub struct RemoteController {
    base_url: String,
}

impl RemoteController {
    /// Creates a new `RemoteController`.
    ///
    /// # Arguments
    /// * `base_url` - Where the controller's server listens, e.g. `http://127.0.0.1:7400`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn acquire(&self, key: &BucketKey, cost: f64) -> Result<Decision, RemoteError> {
        let url = self.request_url("acquire", &[("key", key.to_string()), ("cost", cost.to_string())]);
        let (status, body) = self.get(&url)?;
        decode_acquire(status, &body)
    }

    pub fn inspect(&self, key: &BucketKey) -> Result<f64, RemoteError> {
        let url = self.request_url("inspect", &[("key", key.to_string())]);
        let (status, body) = self.get(&url)?;
        decode_inspect(status, &body)
    }

    /// Sends a bypass adjustment. The server only acknowledges receipt.
    pub fn adjust_tokens(&self, key: &BucketKey, amount: f64) -> Result<(), RemoteError> {
        let url = self.request_url(
            "adjust",
            &[("key", key.to_string()), ("amount", amount.to_string())],
        );
        let (status, body) = self.get(&url)?;
        expect_accepted(status, body)
    }

    /// Sends a partial configuration change. The server only acknowledges receipt.
    pub fn update_configuration(&self, update: &ConfigUpdate) -> Result<(), RemoteError> {
        let mut pairs = Vec::new();
        if let Some(max) = update.max_accumulated {
            pairs.push(("max_accumulated", max.to_string()));
        }
        if let Some(refill) = update.refill {
            pairs.push(("refill", refill.to_string()));
        }
        if let Some(interval) = update.interval_ms {
            pairs.push(("interval_ms", interval.to_string()));
        }
        let url = self.request_url("configure", &pairs);
        let (status, body) = self.get(&url)?;
        expect_accepted(status, body)
    }

    fn request_url(&self, operation: &str, pairs: &[(&str, String)]) -> String {
        let mut params = form_urlencoded::Serializer::new(String::new());
        for (name, value) in pairs {
            params.append_pair(name, value);
        }
        let query = params.finish();
        if query.is_empty() {
            format!("{}/{}", self.base_url, operation)
        } else {
            format!("{}/{}?{}", self.base_url, operation, query)
        }
    }

    fn get(&self, url: &str) -> Result<(u16, String), RemoteError> {
        debug!(url, "sending request");
        let response = reqwest::blocking::get(url)?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok((status, body))
    }
}

fn decode_acquire(status: u16, body: &str) -> Result<Decision, RemoteError> {
    match status {
        200 | 429 => {
            let reply: AcquireReply = serde_json::from_str(body)?;
            Ok(reply.into())
        }
        _ => Err(RemoteError::Status {
            status,
            body: body.to_string(),
        }),
    }
}

fn decode_inspect(status: u16, body: &str) -> Result<f64, RemoteError> {
    if status != 200 {
        return Err(RemoteError::Status {
            status,
            body: body.to_string(),
        });
    }
    let reply: InspectReply = serde_json::from_str(body)?;
    Ok(reply.tokens)
}

fn expect_accepted(status: u16, body: String) -> Result<(), RemoteError> {
    if status == 202 {
        Ok(())
    } else {
        Err(RemoteError::Status { status, body })
    }
}
