//! Per-bucket accounting state.

use crate::key::BucketKey;
use std::collections::HashMap;

/// The recorded balance of a single bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketState {
    /// Token balance at `last_update`. May be negative or above capacity after a
    /// bypass adjustment.
    pub tokens: f64,
    /// Time of the last commit, in milliseconds.
    pub last_update: u64,
}

/// Mapping from bucket key to its recorded state.
///
/// The table has no interior synchronization: it is owned by exactly one
/// controller and only touched from that controller's processing loop.
#[derive(Debug, Default)]
pub struct BucketTable {
    buckets: HashMap<BucketKey, BucketState>,
}

impl BucketTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded state for `key`, if the bucket has been touched.
    pub fn lookup(&self, key: &BucketKey) -> Option<BucketState> {
        self.buckets.get(key).copied()
    }

    /// Records a bucket for the first time.
    pub fn insert(&mut self, key: BucketKey, tokens: f64, now: u64) {
        self.buckets.insert(
            key,
            BucketState {
                tokens,
                last_update: now,
            },
        );
    }

    /// Overwrites both fields of an existing bucket.
    ///
    /// Returns `false` and leaves the table untouched if the key is absent.
    pub fn update_in_place(&mut self, key: &BucketKey, tokens: f64, now: u64) -> bool {
        match self.buckets.get_mut(key) {
            Some(state) => {
                state.tokens = tokens;
                state.last_update = now;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_absent() {
        let table = BucketTable::new();
        assert!(table.lookup(&BucketKey::Int(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_then_update() {
        let mut table = BucketTable::new();
        let key = BucketKey::from("10.0.0.1");

        table.insert(key.clone(), 3.5, 100);
        assert_eq!(
            table.lookup(&key),
            Some(BucketState {
                tokens: 3.5,
                last_update: 100
            })
        );

        assert!(table.update_in_place(&key, -1.0, 250));
        let state = table.lookup(&key).expect("Bucket should exist");
        assert_eq!(state.tokens, -1.0);
        assert_eq!(state.last_update, 250);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_absent_key_is_noop() {
        let mut table = BucketTable::new();
        assert!(!table.update_in_place(&BucketKey::tag("missing"), 1.0, 1));
        assert!(table.is_empty());
    }
}
