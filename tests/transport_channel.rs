mod common;

use async_trait::async_trait;
use bouncer::access::{AccessList, AccessListStore};
use bouncer::rate_limit::InMemoryBucketStore;
use bouncer::{
    AuthorizeRequest, Bouncer, BouncerConfig, CallContext, ChannelError, ChannelTransport, Command, Reply,
    StoreError,
};
use common::test_helpers::{harness, limits};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn channel_transport_roundtrip() {
    let h = harness(limits(5, 5, 5, 60));
    let transport = ChannelTransport::new(h.bouncer.clone());

    let res = transport.send(Command::AddToWhitelist { subnet: "10.10.0.0/16".into() }).await.unwrap();
    assert_eq!(res, Reply::Message { ok: true, message: "Added 10.10.0.0/16 to the whitelist".into() });

    let res = transport.send(Command::Authorize(AuthorizeRequest::ip("10.10.3.3"))).await.unwrap();
    assert_eq!(res, Reply::Verdict { authorized: true, message: "IP is whitelisted".into() });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_the_bucket() {
    let h = harness(limits(5, 5, 7, 3600));
    let transport = ChannelTransport::new(h.bouncer.clone());

    let calls = (0..20).map(|_| {
        let t = transport.clone();
        tokio::spawn(async move { t.send(Command::Authorize(AuthorizeRequest::ip("198.18.0.1"))).await })
    });
    let mut authorized = 0;
    for call in calls.collect::<Vec<_>>() {
        if let Reply::Verdict { authorized: true, .. } = call.await.unwrap().unwrap() {
            authorized += 1;
        }
    }
    assert_eq!(authorized, 7);
}

#[tokio::test]
async fn errors_come_back_typed() {
    let h = harness(limits(5, 5, 5, 60));
    let transport = ChannelTransport::new(h.bouncer.clone());
    let err = transport.send(Command::ResetBucket { ip: None, login: None }).await.unwrap_err();
    assert!(matches!(err, ChannelError::Bouncer(ref e) if e.is_input_error()));
}

#[tokio::test]
async fn cancelled_context_is_reported() {
    let h = harness(limits(5, 5, 5, 60));
    let transport = ChannelTransport::new(h.bouncer.clone());
    let token = CancellationToken::new();
    token.cancel();

    let err = transport
        .send_with(CallContext::background().with_cancellation(token), Command::Authorize(AuthorizeRequest::ip("1.1.1.1")))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Bouncer(ref e) if e.is_cancelled()));
    assert!(h.buckets.is_empty());
}

/// Access list store that never answers.
struct Stalled;

#[async_trait]
impl AccessListStore for Stalled {
    async fn insert(&self, _: AccessList, _: &str) -> Result<(), StoreError> {
        std::future::pending().await
    }
    async fn delete(&self, _: AccessList, _: &str) -> Result<u64, StoreError> {
        std::future::pending().await
    }
    async fn get_all(&self, _: AccessList) -> Result<Vec<String>, StoreError> {
        std::future::pending().await
    }
    async fn exists_exact(&self, _: AccessList, _: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn configured_call_timeout_bounds_channel_calls() {
    let cfg = BouncerConfig::from_json_str(r#"{"call_timeout_ms": 100}"#).unwrap();
    let bouncer = Bouncer::from_config(&cfg, Arc::new(InMemoryBucketStore::new()), Arc::new(Stalled));
    let transport = ChannelTransport::new(bouncer);

    let res = tokio::time::timeout(
        Duration::from_secs(2),
        transport.send(Command::Authorize(AuthorizeRequest::ip("1.1.1.1"))),
    )
    .await
    .expect("call deadline should fire before the outer guard");
    assert!(matches!(res, Err(ChannelError::Bouncer(ref e)) if e.is_timeout()));
}

#[tokio::test(start_paused = true)]
async fn explicit_context_overrides_configured_timeout() {
    let cfg = BouncerConfig::from_json_str(r#"{"call_timeout_ms": 60000}"#).unwrap();
    let bouncer = Bouncer::from_config(&cfg, Arc::new(InMemoryBucketStore::new()), Arc::new(Stalled));
    let transport = ChannelTransport::new(bouncer);

    let err = transport
        .send_with(
            CallContext::with_timeout(Duration::from_millis(20)),
            Command::ListNetworks { list: AccessList::Whitelist },
        )
        .await
        .unwrap_err();
    let ChannelError::Bouncer(err) = err else { panic!("unexpected {err:?}") };
    assert_eq!(err.timeout_details().map(|(_, budget)| budget), Some(Duration::from_millis(20)));
}
