//! Per-call deadline and cancellation.
//!
//! Store round trips are the only blocking points in the core. A [`CallContext`] bounds
//! them: when the deadline passes or the token is cancelled, the in-flight store future is
//! dropped and the caller gets [`BouncerError::Timeout`] or [`BouncerError::Cancelled`],
//! never a verdict.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::BouncerError;

#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    budget: Duration,
}

/// Deadline and cancellation shared by all store calls made for one request.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Deadline>,
    cancel: Option<CancellationToken>,
}

impl CallContext {
    /// No deadline, not cancellable.
    pub fn background() -> Self {
        Self::default()
    }

    /// Deadline `budget` from now.
    pub fn with_timeout(budget: Duration) -> Self {
        Self { deadline: Some(Deadline { started: Instant::now(), budget }), cancel: None }
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Time left before the deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.budget.saturating_sub(d.started.elapsed()))
    }

    /// Whether the attached token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(CancellationToken::is_cancelled).unwrap_or(false)
    }

    /// Drive `operation` under this context.
    pub async fn run<T, Fut>(&self, operation: Fut) -> Result<T, BouncerError>
    where
        Fut: Future<Output = Result<T, BouncerError>>,
    {
        if self.is_cancelled() {
            return Err(BouncerError::Cancelled);
        }

        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d.started + d.budget).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(BouncerError::Cancelled),
            _ = expired => {
                let d = self.deadline.map(|d| (d.started.elapsed(), d.budget)).unwrap_or_default();
                Err(BouncerError::Timeout { elapsed: d.0, timeout: d.1 })
            }
            result = operation => result,
        }
    }
}
