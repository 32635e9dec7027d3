#![allow(dead_code)]

use bouncer::access::{AccessResolver, InMemoryAccessListStore};
use bouncer::rate_limit::{InMemoryBucketStore, LeakyBucket};
use bouncer::{Bouncer, DecisionEngine, KeyNamespace, ListAdmin, ManualClock, RateLimits};
use std::sync::Arc;
use std::time::Duration;

pub const T0: i64 = 1_700_000_000;

/// Bouncer over in-memory stores with a manual clock.
pub struct Harness {
    pub bouncer: Bouncer,
    pub clock: ManualClock,
    pub buckets: InMemoryBucketStore,
    pub lists: InMemoryAccessListStore,
}

pub fn limits(login: u32, password: u32, ip: u32, leak_secs: u64) -> RateLimits {
    RateLimits { login, password, ip, leak_rate: Duration::from_secs(leak_secs) }
}

pub fn harness(limits: RateLimits) -> Harness {
    harness_with(limits, KeyNamespace::Shared)
}

pub fn harness_with(limits: RateLimits, namespace: KeyNamespace) -> Harness {
    let clock = ManualClock::new(T0);
    let buckets = InMemoryBucketStore::new();
    let lists = InMemoryAccessListStore::new();
    let limiter = LeakyBucket::new(buckets.clone()).with_clock(Arc::new(clock.clone()));
    let resolver = AccessResolver::new(Arc::new(lists.clone()));
    let engine = DecisionEngine::new(resolver.clone(), Arc::new(limiter), limits).with_namespace(namespace);
    let bouncer = Bouncer::new(engine, ListAdmin::new(resolver));
    Harness { bouncer, clock, buckets, lists }
}
