//! Rate limiting primitives.
//!
//! This module provides the building blocks for per-identifier rate limiting:
//! - [`RateLimiter`]: The core trait for rate limiting logic.
//! - [`Decision`]: The result of a rate limit check (Allowed/Denied).
//! - [`BucketLimit`]: Capacity and leak rate supplied by the caller on every check.
//!
//! # Architecture
//!
//! - **Logic**: [`LeakyBucket`] (in `leaky_bucket` module) handles the math and the
//!   optimistic check-and-set loop.
//! - **Storage**: [`BucketStore`] (in `store` module) holds `(count, last_leak)` per key,
//!   enabling in-memory or distributed backends (see the `bouncer-redis` crate).
//!
//! Nothing is cached in-process: every check reads the store and every admission is
//! committed with a compare-and-set, so the store is the only serialization point.

use std::time::Duration;

use crate::BouncerError;

pub mod leaky_bucket;
pub mod store;
pub use leaky_bucket::LeakyBucket;
pub use store::{BucketState, BucketStore, InMemoryBucketStore};

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is admitted and one unit was consumed.
    Allowed {
        /// Bucket count after the admission.
        count: u64,
    },
    /// The bucket is full; nothing was written.
    Denied {
        /// Bucket count after leakage, at or above capacity.
        count: u64,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Bucket count observed by the check.
    pub fn count(&self) -> u64 {
        match self {
            Decision::Allowed { count } | Decision::Denied { count } => *count,
        }
    }
}

/// Capacity and leak rate for a single check. Not stored; supplied per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimit {
    capacity: u32,
    leak_rate: Duration,
}

impl BucketLimit {
    /// Build a limit. `capacity` and `leak_rate` must both be non-zero.
    pub fn new(capacity: u32, leak_rate: Duration) -> Result<Self, BouncerError> {
        if capacity == 0 {
            return Err(BouncerError::InvalidLimit("capacity must be greater than zero".into()));
        }
        if leak_rate.is_zero() {
            return Err(BouncerError::InvalidLimit("leak rate must be greater than zero".into()));
        }
        Ok(Self { capacity, leak_rate })
    }

    /// Maximum count before requests are denied.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Time for a full bucket to drain.
    pub fn leak_rate(&self) -> Duration {
        self.leak_rate
    }
}

/// Core interface for rate limiting logic.
///
/// Decouples the decision engine from the algorithm and the storage backend.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check `key` against `limit`, consuming one unit when admitted.
    async fn check(&self, key: &str, limit: BucketLimit) -> Result<Decision, BouncerError>;

    /// Drop all state for `key`. Resetting an unknown key is not an error.
    async fn reset(&self, key: &str) -> Result<(), BouncerError>;
}
