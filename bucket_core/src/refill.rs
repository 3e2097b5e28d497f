//! Lazy, fractional token refill.

use crate::config::Configuration;

/// Computes the balance available at `now` for a bucket last committed at
/// `last_update` with `stored` tokens.
///
/// Growth is continuous: `refill` tokens per `interval_ms`, with no rounding, capped
/// at `max_accumulated`. There is no lower clamp, so an overdrawn balance stays
/// negative until enough time has passed.
///
/// # Arguments
///
/// * `stored` - The balance recorded at the last commit.
/// * `now` - The current time in milliseconds.
/// * `last_update` - The time of the last commit in milliseconds.
/// * `config` - The configuration in force right now.
pub fn accumulate(stored: f64, now: u64, last_update: u64, config: &Configuration) -> f64 {
    let elapsed = now.saturating_sub(last_update) as f64;
    let grown = stored + (elapsed / config.interval_ms) * config.refill;
    grown.min(config.max_accumulated)
}
