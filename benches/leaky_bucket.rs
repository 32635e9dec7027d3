use criterion::{black_box, criterion_group, criterion_main, Criterion};
use bouncer::access::{AccessList, AccessListStore, InMemoryAccessListStore};
use bouncer::rate_limit::{BucketLimit, InMemoryBucketStore, LeakyBucket, RateLimiter};
use bouncer::{AuthorizeRequest, Bouncer, BouncerConfig, Command};

use std::sync::Arc;
use std::time::Duration;

fn leaky_bucket_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = LeakyBucket::new(InMemoryBucketStore::new());
    // Large enough that the bench measures admissions, not denials.
    let limit = BucketLimit::new(u32::MAX, Duration::from_secs(60)).unwrap();

    c.bench_function("leaky_bucket_admit_single_key", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(limiter.check("bench-key", limit).await.unwrap());
        })
    });

    let full = BucketLimit::new(1, Duration::from_secs(3600)).unwrap();
    rt.block_on(limiter.check("full-key", full)).unwrap();
    c.bench_function("leaky_bucket_deny_full_key", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(limiter.check("full-key", full).await.unwrap());
        })
    });
}

fn authorize_with_lists(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let lists = InMemoryAccessListStore::new();
    rt.block_on(async {
        for i in 0..64u8 {
            lists.insert(AccessList::Blacklist, &format!("10.{i}.0.0/16")).await.unwrap();
        }
    });

    let mut cfg = BouncerConfig::default();
    cfg.leaky_bucket.ip_capacity = u32::MAX;
    cfg.leaky_bucket.login_capacity = u32::MAX;
    cfg.leaky_bucket.password_capacity = u32::MAX;
    let bouncer = Bouncer::from_config(&cfg, Arc::new(InMemoryBucketStore::new()), Arc::new(lists));
    let cmd = Command::Authorize(AuthorizeRequest::new("192.0.2.10", "bench", "secret"));

    c.bench_function("authorize_64_blacklist_rows", |b| {
        b.to_async(&rt).iter(|| async {
            let ctx = bouncer.context();
            black_box(bouncer.execute(&ctx, cmd.clone()).await.unwrap());
        })
    });
}

criterion_group!(benches, leaky_bucket_check, authorize_with_lists);
criterion_main!(benches);
