use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Bouncer, Command, Reply};
use crate::BouncerError;

/// Wire envelope for one request.
///
/// Transport-agnostic: TCP lines, channels or HTTP bodies all map to this shape.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Caller-chosen identifier echoed in the reply.
    pub id: String,
    /// Per-call deadline; the service default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub command: Command,
}

/// Wire envelope for one reply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyEnvelope {
    pub id: String,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok(Reply),
    Error(Failure),
}

/// Structured failure sent to callers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// Caller input was rejected before reaching any store.
    InvalidInput { msg: String },
    /// A store failed; no verdict was produced.
    Store { msg: String },
    Timeout { msg: String },
    Cancelled { msg: String },
    /// The frame itself could not be decoded.
    Malformed { msg: String },
}

impl From<&BouncerError> for Failure {
    fn from(err: &BouncerError) -> Self {
        let msg = err.to_string();
        match err {
            BouncerError::Timeout { .. } => Failure::Timeout { msg },
            BouncerError::Cancelled => Failure::Cancelled { msg },
            e if e.is_input_error() => Failure::InvalidInput { msg },
            _ => Failure::Store { msg },
        }
    }
}

/// Transport abstraction for encoding/decoding bouncer frames.
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Decode a raw frame into a request envelope.
    fn decode(&self, raw: &[u8]) -> Result<RequestEnvelope, Self::Error>;

    /// Encode a reply envelope into an outgoing frame.
    fn encode(&self, reply: &ReplyEnvelope) -> Result<Vec<u8>, Self::Error>;
}

/// JSON frames, one envelope per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransport;

impl Transport for JsonTransport {
    type Error = serde_json::Error;

    fn decode(&self, raw: &[u8]) -> Result<RequestEnvelope, Self::Error> {
        serde_json::from_slice(raw)
    }

    fn encode(&self, reply: &ReplyEnvelope) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(reply)
    }
}

/// Decode `raw`, execute it on `bouncer`, and build the reply envelope.
///
/// Undecodable frames get a `malformed` failure; the id is recovered when the frame is
/// at least a JSON object with a string `id`.
pub async fn handle_frame<T: Transport>(bouncer: &Bouncer, transport: &T, raw: &[u8]) -> ReplyEnvelope {
    let env = match transport.decode(raw) {
        Ok(env) => env,
        Err(err) => {
            debug!(target: "bouncer::service", error = %err, "malformed frame");
            return ReplyEnvelope {
                id: recover_id(raw),
                outcome: Outcome::Error(Failure::Malformed { msg: err.to_string() }),
            };
        }
    };

    let ctx = match env.timeout_ms {
        Some(ms) => crate::CallContext::with_timeout(Duration::from_millis(ms)),
        None => bouncer.context(),
    };
    let outcome = match bouncer.execute(&ctx, env.command).await {
        Ok(reply) => Outcome::Ok(reply),
        Err(err) => Outcome::Error(Failure::from(&err)),
    };
    ReplyEnvelope { id: env.id, outcome }
}

fn recover_id(raw: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_default()
}
