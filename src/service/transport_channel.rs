use tokio::sync::{mpsc, oneshot};

use super::{Bouncer, Command, Reply};
use crate::context::CallContext;
use crate::BouncerError;

type Job = (Option<CallContext>, Command, oneshot::Sender<Result<Reply, BouncerError>>);

/// Errors surfaced by [`ChannelTransport`].
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    /// The dispatcher task has stopped.
    #[error("channel transport closed")]
    Closed,
    #[error(transparent)]
    Bouncer(#[from] BouncerError),
}

/// In-process channel-based transport.
///
/// A dispatcher task drains the queue and spawns one task per call, so a slow store
/// round trip never holds up the calls queued behind it.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Job>,
}

impl ChannelTransport {
    /// Create a channel transport and spawn its dispatcher. Requires a tokio runtime.
    pub fn new(bouncer: Bouncer) -> Self {
        Self::with_capacity(bouncer, 64)
    }

    pub fn with_capacity(bouncer: Bouncer, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity);
        tokio::spawn(async move {
            while let Some((ctx, cmd, reply_tx)) = rx.recv().await {
                let bouncer = bouncer.clone();
                tokio::spawn(async move {
                    let ctx = ctx.unwrap_or_else(|| bouncer.context());
                    let res = bouncer.execute(&ctx, cmd).await;
                    let _ = reply_tx.send(res);
                });
            }
        });
        Self { tx }
    }

    /// Send a command under the bouncer's default call deadline and await its reply.
    pub async fn send(&self, cmd: Command) -> Result<Reply, ChannelError> {
        self.dispatch(None, cmd).await
    }

    /// Send a command under `ctx` and await its reply.
    pub async fn send_with(&self, ctx: CallContext, cmd: Command) -> Result<Reply, ChannelError> {
        self.dispatch(Some(ctx), cmd).await
    }

    async fn dispatch(&self, ctx: Option<CallContext>, cmd: Command) -> Result<Reply, ChannelError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx.send((ctx, cmd, resp_tx)).await.map_err(|_| ChannelError::Closed)?;
        Ok(resp_rx.await.map_err(|_| ChannelError::Closed)??)
    }
}
