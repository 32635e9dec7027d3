//! Command surface of the bouncer.
//!
//! [`Bouncer`] bundles the decision engine and the list admin behind one
//! [`Command`] → [`Reply`] entry point, also exposed as a `tower::Service`.
//! Transports (see [`transport`] and [`transport_channel`]) map their frames onto
//! these types.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_service::Service;
use tracing::{debug, warn};

use crate::access::{AccessList, AccessListStore, AccessResolver};
use crate::admin::ListAdmin;
use crate::config::BouncerConfig;
use crate::context::CallContext;
use crate::decision::{AuthorizeRequest, DecisionEngine};
use crate::rate_limit::{BucketStore, LeakyBucket};
use crate::BouncerError;

pub mod transport;
pub mod transport_channel;

/// Operations accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Authorize(AuthorizeRequest),
    ResetBucket {
        #[serde(default)]
        ip: Option<String>,
        #[serde(default)]
        login: Option<String>,
    },
    AddToWhitelist { subnet: String },
    AddToBlacklist { subnet: String },
    RemoveFromWhitelist { subnet: String },
    RemoveFromBlacklist { subnet: String },
    ListNetworks { list: AccessList },
}

impl Command {
    /// Stable name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Authorize(_) => "authorize",
            Command::ResetBucket { .. } => "reset_bucket",
            Command::AddToWhitelist { .. } => "add_to_whitelist",
            Command::AddToBlacklist { .. } => "add_to_blacklist",
            Command::RemoveFromWhitelist { .. } => "remove_from_whitelist",
            Command::RemoveFromBlacklist { .. } => "remove_from_blacklist",
            Command::ListNetworks { .. } => "list_networks",
        }
    }
}

/// Successful results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// Answer to `Authorize`.
    Verdict { authorized: bool, message: String },
    /// Answer to reset and list mutations. `ok` is false for informational outcomes
    /// such as "already whitelisted" or "not found".
    Message { ok: bool, message: String },
    /// Answer to `ListNetworks`.
    Networks { list: AccessList, networks: Vec<String> },
}

/// Facade over the decision engine and list admin.
#[derive(Clone, Debug)]
pub struct Bouncer {
    engine: Arc<DecisionEngine>,
    admin: Arc<ListAdmin>,
    call_timeout: Option<Duration>,
}

impl Bouncer {
    pub fn new(engine: DecisionEngine, admin: ListAdmin) -> Self {
        Self { engine: Arc::new(engine), admin: Arc::new(admin), call_timeout: None }
    }

    /// Wire a bouncer from configuration and the two stores.
    pub fn from_config(
        cfg: &BouncerConfig,
        buckets: Arc<dyn BucketStore>,
        lists: Arc<dyn AccessListStore>,
    ) -> Self {
        let limiter = LeakyBucket::new(buckets).with_max_attempts(cfg.leaky_bucket.max_cas_attempts);
        let resolver = AccessResolver::new(lists);
        let engine = DecisionEngine::new(resolver.clone(), Arc::new(limiter), cfg.rate_limits())
            .with_namespace(cfg.leaky_bucket.key_namespace);
        let mut bouncer = Self::new(engine, ListAdmin::new(resolver));
        bouncer.call_timeout = cfg.call_timeout();
        bouncer
    }

    /// Deadline applied by [`Bouncer::context`].
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Fresh context carrying the default call deadline, if configured.
    pub fn context(&self) -> CallContext {
        match self.call_timeout {
            Some(t) => CallContext::with_timeout(t),
            None => CallContext::background(),
        }
    }

    /// Run one command under `ctx`.
    pub async fn execute(&self, ctx: &CallContext, cmd: Command) -> Result<Reply, BouncerError> {
        let label = cmd.label();
        let result = self.dispatch(ctx, cmd).await;
        match &result {
            Ok(_) => debug!(target: "bouncer::service", command = label, "command completed"),
            Err(err) if err.is_input_error() => {
                debug!(target: "bouncer::service", command = label, error = %err, "rejected input")
            }
            Err(err) => warn!(target: "bouncer::service", command = label, error = %err, "command failed"),
        }
        result
    }

    async fn dispatch(&self, ctx: &CallContext, cmd: Command) -> Result<Reply, BouncerError> {
        match cmd {
            Command::Authorize(req) => {
                let verdict = self.engine.authorize(ctx, &req).await?;
                Ok(Reply::Verdict { authorized: verdict.authorized, message: verdict.message().to_string() })
            }
            Command::ResetBucket { ip, login } => {
                self.engine.reset(ctx, ip.as_deref(), login.as_deref()).await?;
                Ok(Reply::Message { ok: true, message: "Bucket reset".into() })
            }
            Command::AddToWhitelist { subnet } => self.add(ctx, AccessList::Whitelist, &subnet).await,
            Command::AddToBlacklist { subnet } => self.add(ctx, AccessList::Blacklist, &subnet).await,
            Command::RemoveFromWhitelist { subnet } => {
                self.remove(ctx, AccessList::Whitelist, &subnet).await
            }
            Command::RemoveFromBlacklist { subnet } => {
                self.remove(ctx, AccessList::Blacklist, &subnet).await
            }
            Command::ListNetworks { list } => {
                let networks = self.admin.list(ctx, list).await?.iter().map(ToString::to_string).collect();
                Ok(Reply::Networks { list, networks })
            }
        }
    }

    async fn add(&self, ctx: &CallContext, list: AccessList, subnet: &str) -> Result<Reply, BouncerError> {
        let out = self.admin.add(ctx, list, subnet).await?;
        Ok(Reply::Message { ok: out.is_added(), message: out.message() })
    }

    async fn remove(&self, ctx: &CallContext, list: AccessList, subnet: &str) -> Result<Reply, BouncerError> {
        let out = self.admin.remove(ctx, list, subnet).await?;
        Ok(Reply::Message { ok: out.is_removed(), message: out.message() })
    }
}

impl Service<Command> for Bouncer {
    type Response = Reply;
    type Error = BouncerError;
    type Future = BoxFuture<'static, Result<Reply, BouncerError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, cmd: Command) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let ctx = this.context();
            this.execute(&ctx, cmd).await
        })
    }
}
