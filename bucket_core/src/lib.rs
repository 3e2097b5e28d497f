//! Core accounting types for the token-bucket admission controller.
//!
//! This library provides the bucket key and state representation, the lazy refill
//! calculation and the configuration shared by the controller and its clients.

pub mod clock;
pub mod config;
pub mod decision;
pub mod key;
pub mod refill;
pub mod table;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigBuilder, ConfigError, ConfigUpdate, Configuration, DEFAULT_INTERVAL_MS};
pub use decision::{AcquireReply, Decision, InspectReply};
pub use key::{BucketKey, KeyParseError};
pub use refill::accumulate;
pub use table::{BucketState, BucketTable};
