//! TCP front end for bouncer.
//!
//! Usage: `bouncer-server [config.json]`
//!
//! Each connection carries newline-delimited JSON request envelopes; replies are written
//! back one per line, in completion order, carrying the request `id`.
//!
//! A frame longer than [`MAX_FRAME_BYTES`] closes the connection. At most
//! [`MAX_IN_FLIGHT`] frames per connection are processed at once; further frames wait
//! unread until a slot frees up.

use anyhow::{anyhow, Context, Result};
use bouncer::{handle_frame, Bouncer, BouncerConfig, JsonTransport, Transport};
use bouncer_postgres::PgAccessListStore;
use bouncer_redis::RedisBucketStore;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Longest accepted request line, excluding the newline.
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Frames processed concurrently per connection.
const MAX_IN_FLIGHT: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => BouncerConfig::load(&path).with_context(|| format!("loading config from {path}"))?,
        None => BouncerConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.logger.level))
        .context("invalid logger.level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut buckets = RedisBucketStore::connect(&cfg.redis.url)
        .await
        .with_context(|| format!("connecting to redis at {}", cfg.redis.url))?;
    if let Some(ttl) = cfg.redis.idle_ttl_secs {
        buckets = buckets.with_idle_ttl(Duration::from_secs(ttl));
    }

    let lists = PgAccessListStore::connect(&cfg.sql_storage.dsn, cfg.sql_storage.max_connections)
        .await
        .context("connecting to postgres")?;
    lists.ensure_schema().await.context("creating access list tables")?;

    let bouncer = Bouncer::from_config(&cfg, Arc::new(buckets), Arc::new(lists));

    let listener = TcpListener::bind(&cfg.server.listen)
        .await
        .with_context(|| format!("binding {}", cfg.server.listen))?;
    info!(target: "bouncer::service", addr = %cfg.server.listen, "listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let bouncer = bouncer.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(bouncer, stream, peer).await {
                            warn!(target: "bouncer::service", %peer, error = %err, "connection closed with error");
                        }
                    });
                }
                Err(err) => error!(target: "bouncer::service", error = %err, "accept failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!(target: "bouncer::service", "shutting down");
                return Ok(());
            }
        }
    }
}

async fn serve_connection<S>(bouncer: Bouncer, stream: S, peer: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    debug!(target: "bouncer::service", %peer, "connection opened");
    let (read, mut write) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(MAX_IN_FLIGHT);

    let writer = tokio::spawn(async move {
        while let Some(mut frame) = rx.recv().await {
            frame.push(b'\n');
            write.write_all(&frame).await?;
        }
        write.shutdown().await
    });

    let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut frames = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
    let mut result = Ok(());
    while let Some(next) = frames.next().await {
        let line = match next {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(target: "bouncer::service", %peer, limit = MAX_FRAME_BYTES, "frame too long, closing connection");
                result = Err(anyhow!("frame exceeds {MAX_FRAME_BYTES} bytes"));
                break;
            }
            Err(LinesCodecError::Io(err)) => {
                result = Err(err.into());
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let permit = in_flight.clone().acquire_owned().await.context("frame limiter closed")?;
        let bouncer = bouncer.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let transport = JsonTransport;
            let reply = handle_frame(&bouncer, &transport, line.as_bytes()).await;
            match transport.encode(&reply) {
                Ok(frame) => {
                    let _ = tx.send(frame).await;
                }
                Err(err) => error!(target: "bouncer::service", error = %err, "failed to encode reply"),
            }
            drop(permit);
        });
    }

    drop(tx);
    writer.await.context("writer task panicked")??;
    debug!(target: "bouncer::service", %peer, "connection closed");
    result
}
