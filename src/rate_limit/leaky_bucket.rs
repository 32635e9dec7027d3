use crate::clock::{Clock, SystemClock};
use crate::rate_limit::store::{BucketState, BucketStore};
use crate::rate_limit::{BucketLimit, Decision, RateLimiter};
use crate::{BouncerError, StoreError};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of compare-and-set attempts before giving up with
/// [`StoreError::Contention`].
pub const DEFAULT_MAX_CAS_ATTEMPTS: usize = 16;

/// Upper bound of the randomized pause after the first lost race; grows linearly per attempt.
const CAS_PAUSE_STEP: Duration = Duration::from_micros(500);

/// Outcome of applying one check to a bucket snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Admit and commit `next`.
    Admit { next: BucketState },
    /// Deny; `count` is the leaked count, left unwritten.
    Deny { count: u64 },
}

/// Pure leaky-bucket transition: leak by elapsed time, then try to add one unit.
///
/// A missing `last_leak` counts as `now`, and a `last_leak` in the future (clock skew
/// between processes) counts as zero elapsed time, so neither grants leak credit.
pub fn step(state: BucketState, now: i64, limit: BucketLimit) -> Step {
    let last_leak = state.last_leak.unwrap_or(now);
    let elapsed = now.saturating_sub(last_leak).max(0);
    let capacity = u64::from(limit.capacity());

    let count = state.count.saturating_sub(leaked_units(elapsed, limit));

    if count < capacity {
        Step::Admit { next: BucketState { count: count + 1, last_leak: Some(now) } }
    } else {
        Step::Deny { count }
    }
}

/// `floor(elapsed / leak_rate * capacity)` in exact integer arithmetic, saturating at `u64::MAX`.
fn leaked_units(elapsed_secs: i64, limit: BucketLimit) -> u64 {
    let elapsed_nanos = u128::from(elapsed_secs.unsigned_abs()).saturating_mul(1_000_000_000);
    let leaked = elapsed_nanos.saturating_mul(u128::from(limit.capacity())) / limit.leak_rate().as_nanos();
    u64::try_from(leaked).unwrap_or(u64::MAX)
}

/// A leaky-bucket rate limiter over a shared [`BucketStore`].
///
/// Each key holds an integer count that drains lazily: leakage is recomputed from the
/// elapsed wall-clock time on every check, so no background timer is needed. The
/// read-evaluate-write sequence is committed with the store's compare-and-set and retried
/// on conflict, which keeps two concurrent checks from admitting off the same snapshot.
pub struct LeakyBucket<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    max_attempts: usize,
}

impl<S> std::fmt::Debug for LeakyBucket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeakyBucket")
            .field("clock", &self.clock)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl<S> LeakyBucket<S>
where
    S: BucketStore + 'static,
{
    /// Create a new LeakyBucket backed by `store`, using the system clock.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            max_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }

    /// Replace the clock (tests, simulations).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cap the number of compare-and-set attempts per check. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Borrow the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn pause(attempt: usize) {
        let max = CAS_PAUSE_STEP.as_micros() as u64 * attempt as u64;
        let micros = rand::rng().random_range(0..=max);
        tokio::time::sleep(Duration::from_micros(micros)).await;
    }
}

#[async_trait]
impl<S> RateLimiter for LeakyBucket<S>
where
    S: BucketStore + 'static,
{
    async fn check(&self, key: &str, limit: BucketLimit) -> Result<Decision, BouncerError> {
        for attempt in 1..=self.max_attempts {
            let now = self.clock.now_unix();
            let current = self.store.get(key).await?;

            match step(current, now, limit) {
                Step::Deny { count } => {
                    info!(target: "bouncer::limiter", key, count, capacity = limit.capacity(), "rate limit exceeded");
                    return Ok(Decision::Denied { count });
                }
                Step::Admit { next } => {
                    if self.store.compare_and_set(key, current, next).await? {
                        debug!(target: "bouncer::limiter", key, count = next.count, last_leak = now, "admitted");
                        return Ok(Decision::Allowed { count: next.count });
                    }
                    debug!(target: "bouncer::limiter", key, attempt, "lost compare-and-set race");
                }
            }

            if attempt < self.max_attempts {
                Self::pause(attempt).await;
            }
        }

        warn!(target: "bouncer::limiter", key, attempts = self.max_attempts, "giving up after repeated compare-and-set conflicts");
        Err(StoreError::Contention { key: key.to_string(), attempts: self.max_attempts }.into())
    }

    async fn reset(&self, key: &str) -> Result<(), BouncerError> {
        self.store.delete(key).await?;
        info!(target: "bouncer::limiter", key, "bucket reset");
        Ok(())
    }
}
