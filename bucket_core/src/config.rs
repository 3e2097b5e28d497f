//! Controller configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Refill interval used when none is given at construction.
pub const DEFAULT_INTERVAL_MS: f64 = 1000.0;

/// Errors raised while building or updating a [`Configuration`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required configuration field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Parameters of one controller instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    /// Identifier of the table this controller owns.
    pub namespace: String,
    /// Capacity of every bucket.
    pub max_accumulated: f64,
    /// Tokens added per `interval_ms`.
    pub refill: f64,
    /// Length of one refill interval in milliseconds.
    pub interval_ms: f64,
}

impl Configuration {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Applies a partial update.
    ///
    /// The update is validated as a whole; on error nothing is changed.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<(), ConfigError> {
        if let Some(max) = update.max_accumulated {
            check_non_negative("max_accumulated", max)?;
        }
        if let Some(refill) = update.refill {
            check_non_negative("refill", refill)?;
        }
        if let Some(interval) = update.interval_ms {
            check_interval(interval)?;
        }

        if let Some(max) = update.max_accumulated {
            self.max_accumulated = max;
        }
        if let Some(refill) = update.refill {
            self.refill = refill;
        }
        if let Some(interval) = update.interval_ms {
            self.interval_ms = interval;
        }
        Ok(())
    }
}

/// Collects construction parameters; [`ConfigBuilder::build`] enforces the
/// required ones.
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    namespace: Option<String>,
    max_accumulated: Option<f64>,
    refill: Option<f64>,
    interval_ms: Option<f64>,
}

impl ConfigBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn max_accumulated(mut self, max: f64) -> Self {
        self.max_accumulated = Some(max);
        self
    }

    pub fn refill(mut self, refill: f64) -> Self {
        self.refill = Some(refill);
        self
    }

    pub fn interval_ms(mut self, interval_ms: f64) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    pub fn build(self) -> Result<Configuration, ConfigError> {
        let namespace = self
            .namespace
            .ok_or(ConfigError::MissingField("namespace"))?;
        let max_accumulated = self
            .max_accumulated
            .ok_or(ConfigError::MissingField("max_accumulated"))?;
        let refill = self.refill.ok_or(ConfigError::MissingField("refill"))?;
        let interval_ms = self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS);

        if namespace.is_empty() {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "must not be empty".to_string(),
            });
        }
        check_non_negative("max_accumulated", max_accumulated)?;
        check_non_negative("refill", refill)?;
        check_interval(interval_ms)?;

        Ok(Configuration {
            namespace,
            max_accumulated,
            refill,
            interval_ms,
        })
    }
}

/// A partial configuration change. Absent fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_accumulated: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refill: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<f64>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.max_accumulated.is_none() && self.refill.is_none() && self.interval_ms.is_none()
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("expected a finite non-negative number, got {}", value),
        });
    }
    Ok(())
}

fn check_interval(value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid {
            field: "interval_ms",
            reason: format!("expected a finite positive number, got {}", value),
        });
    }
    Ok(())
}
