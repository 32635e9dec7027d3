//! Authorization decision engine.
//!
//! One verdict per authentication attempt, first matching rule wins:
//!
//! 1. IP in the whitelist: authorized, rate limits are not consulted.
//! 2. IP in the blacklist: denied.
//! 3. Rate limits for login, then password, then IP (only the fields that are present);
//!    the first exhausted bucket denies with a message naming its dimension.
//! 4. Otherwise authorized.
//!
//! Store errors from either collaborator are returned unchanged; they never become a
//! verdict.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::access::{parse_ip, AccessList, AccessResolver};
use crate::context::CallContext;
use crate::rate_limit::{BucketLimit, RateLimiter};
use crate::BouncerError;

/// Identifier dimension of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Login,
    Password,
    Ip,
}

impl Dimension {
    /// Order in which rate limits are evaluated.
    pub const ORDER: [Dimension; 3] = [Dimension::Login, Dimension::Password, Dimension::Ip];

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Login => "login",
            Dimension::Password => "password",
            Dimension::Ip => "ip",
        }
    }

    fn exceeded_message(self) -> &'static str {
        match self {
            Dimension::Login => "Login rate limit exceeded",
            Dimension::Password => "Password rate limit exceeded",
            Dimension::Ip => "IP rate limit exceeded",
        }
    }
}

/// How bucket keys are derived from identifier values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyNamespace {
    /// The value is the key (canonical address text for IPs); a login equal to that text
    /// shares the IP's bucket.
    #[default]
    Shared,
    /// Keys are prefixed with the dimension (`login:`, `password:`, `ip:`).
    PerDimension,
}

impl KeyNamespace {
    /// Bucket key for `value` in dimension `dim`.
    pub fn key(self, dim: Dimension, value: &str) -> String {
        match self {
            KeyNamespace::Shared => value.to_string(),
            KeyNamespace::PerDimension => format!("{}:{}", dim.label(), value),
        }
    }
}

/// Per-dimension capacities and the shared leak rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub login: u32,
    pub password: u32,
    pub ip: u32,
    /// Time for a full bucket to drain; shared by all dimensions.
    pub leak_rate: Duration,
}

impl RateLimits {
    pub fn capacity(&self, dim: Dimension) -> u32 {
        match dim {
            Dimension::Login => self.login,
            Dimension::Password => self.password,
            Dimension::Ip => self.ip,
        }
    }

    /// Bucket limit for `dim`; fails when the capacity or leak rate is zero.
    pub fn limit(&self, dim: Dimension) -> Result<BucketLimit, BouncerError> {
        BucketLimit::new(self.capacity(dim), self.leak_rate)
    }
}

/// One authentication attempt. Empty fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizeRequest {
    pub ip: String,
    pub login: String,
    pub password: String,
}

impl AuthorizeRequest {
    pub fn new(ip: impl Into<String>, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self { ip: ip.into(), login: login.into(), password: password.into() }
    }

    /// Attempt identified by IP only.
    pub fn ip(ip: impl Into<String>) -> Self {
        Self { ip: ip.into(), ..Self::default() }
    }

    fn value(&self, dim: Dimension) -> &str {
        match dim {
            Dimension::Login => &self.login,
            Dimension::Password => &self.password,
            Dimension::Ip => &self.ip,
        }
    }
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictReason {
    Whitelisted,
    Blacklisted,
    RateLimited(Dimension),
    /// Every present dimension passed its rate limit.
    Passed,
}

/// Outcome of [`DecisionEngine::authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub authorized: bool,
    pub reason: VerdictReason,
}

impl Verdict {
    fn new(reason: VerdictReason) -> Self {
        let authorized = matches!(reason, VerdictReason::Whitelisted | VerdictReason::Passed);
        Self { authorized, reason }
    }

    /// Human-readable message for the caller.
    pub fn message(&self) -> &'static str {
        match self.reason {
            VerdictReason::Whitelisted => "IP is whitelisted",
            VerdictReason::Blacklisted => "IP is blacklisted",
            VerdictReason::RateLimited(dim) => dim.exceeded_message(),
            VerdictReason::Passed => "Authorized",
        }
    }
}

/// Combines the access lists and the rate limiter into one verdict per request.
#[derive(Clone)]
pub struct DecisionEngine {
    resolver: AccessResolver,
    limiter: Arc<dyn RateLimiter>,
    limits: RateLimits,
    namespace: KeyNamespace,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("limits", &self.limits)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    pub fn new(resolver: AccessResolver, limiter: Arc<dyn RateLimiter>, limits: RateLimits) -> Self {
        Self { resolver, limiter, limits, namespace: KeyNamespace::default() }
    }

    /// Choose how bucket keys are derived.
    pub fn with_namespace(mut self, namespace: KeyNamespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Decide whether the attempt may proceed.
    ///
    /// A present but unparseable IP is rejected as an input error before any store is touched.
    pub async fn authorize(
        &self,
        ctx: &CallContext,
        req: &AuthorizeRequest,
    ) -> Result<Verdict, BouncerError> {
        let addr = if req.ip.is_empty() { None } else { Some(parse_ip(&req.ip)?) };

        if let Some(addr) = addr {
            if ctx.run(self.resolver.contains(AccessList::Whitelist, addr)).await? {
                debug!(target: "bouncer::decision", ip = %addr, "whitelisted");
                return Ok(Verdict::new(VerdictReason::Whitelisted));
            }
            if ctx.run(self.resolver.contains(AccessList::Blacklist, addr)).await? {
                info!(target: "bouncer::decision", ip = %addr, "blacklisted");
                return Ok(Verdict::new(VerdictReason::Blacklisted));
            }
        }

        for dim in Dimension::ORDER {
            let value = match (dim, addr) {
                (Dimension::Ip, Some(addr)) => addr.to_string(),
                _ => req.value(dim).to_string(),
            };
            if value.is_empty() {
                continue;
            }

            let limit = self.limits.limit(dim)?;
            let key = self.namespace.key(dim, &value);
            let decision = ctx.run(self.limiter.check(&key, limit)).await?;
            if !decision.is_allowed() {
                info!(target: "bouncer::decision", dimension = dim.label(), count = decision.count(), "rate limited");
                return Ok(Verdict::new(VerdictReason::RateLimited(dim)));
            }
        }

        Ok(Verdict::new(VerdictReason::Passed))
    }

    /// Reset the IP and/or login buckets. At least one non-empty identifier is required.
    ///
    /// Returns the dimensions that were reset.
    pub async fn reset(
        &self,
        ctx: &CallContext,
        ip: Option<&str>,
        login: Option<&str>,
    ) -> Result<Vec<Dimension>, BouncerError> {
        let ip = ip.filter(|s| !s.is_empty());
        let login = login.filter(|s| !s.is_empty());
        if ip.is_none() && login.is_none() {
            return Err(BouncerError::MissingIdentifier);
        }

        let mut targets = Vec::with_capacity(2);
        if let Some(ip) = ip {
            targets.push((Dimension::Ip, parse_ip(ip)?.to_string()));
        }
        if let Some(login) = login {
            targets.push((Dimension::Login, login.to_string()));
        }

        let mut reset = Vec::with_capacity(targets.len());
        for (dim, value) in targets {
            let key = self.namespace.key(dim, &value);
            ctx.run(self.limiter.reset(&key)).await?;
            info!(target: "bouncer::decision", dimension = dim.label(), "bucket reset");
            reset.push(dim);
        }
        Ok(reset)
    }
}
