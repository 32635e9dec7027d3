#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # bouncer
//!
//! Distributed admission control for authentication attempts.
//!
//! Each attempt (IP, login and/or password) is allowed or denied by combining a
//! CIDR whitelist/blacklist with per-identifier leaky-bucket rate limits kept in a
//! shared store.
//!
//! ## Features
//!
//! - **Leaky-bucket limiter** committed with optimistic compare-and-set, so concurrent
//!   callers on one key never over-admit
//! - **CIDR access lists** with canonical subnets and cross-list conflict checks
//! - **Decision engine** with fixed precedence: whitelist, blacklist, login, password, IP
//! - **Pluggable stores** (`bouncer-redis`, `bouncer-postgres`, in-memory for tests)
//! - **Deadlines and cancellation** on every store round trip
//!
//! ## Quick Start
//!
//! ```rust
//! use bouncer::{AuthorizeRequest, Bouncer, BouncerConfig, Command, Reply};
//! use bouncer::access::InMemoryAccessListStore;
//! use bouncer::rate_limit::InMemoryBucketStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bouncer = Bouncer::from_config(
//!         &BouncerConfig::default(),
//!         Arc::new(InMemoryBucketStore::new()),
//!         Arc::new(InMemoryAccessListStore::new()),
//!     );
//!     let ctx = bouncer.context();
//!     let reply = bouncer
//!         .execute(&ctx, Command::Authorize(AuthorizeRequest::new("9.9.9.9", "alice", "")))
//!         .await
//!         .unwrap();
//!     assert!(matches!(reply, Reply::Verdict { authorized: true, .. }));
//! }
//! ```

pub mod access;
pub mod admin;
pub mod clock;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod rate_limit;
pub mod service;

// Re-exports
pub use access::{AccessList, AccessListStore, AccessResolver, Subnet};
pub use admin::{AddOutcome, ListAdmin, RemoveOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BouncerConfig, ConfigError};
pub use context::CallContext;
pub use decision::{
    AuthorizeRequest, DecisionEngine, Dimension, KeyNamespace, RateLimits, Verdict, VerdictReason,
};
pub use error::{BouncerError, StoreError};
pub use rate_limit::{BucketLimit, BucketStore, Decision, LeakyBucket, RateLimiter};
pub use service::transport::{
    handle_frame, Failure, JsonTransport, Outcome, ReplyEnvelope, RequestEnvelope, Transport,
};
pub use service::transport_channel::{ChannelError, ChannelTransport};
pub use service::{Bouncer, Command, Reply};
