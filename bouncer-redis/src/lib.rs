//! Redis bucket store for `bouncer` (companion crate).
//!
//! Each bucket is two plain string keys, `<key>:count` and `<key>:lastLeak` (Unix
//! seconds). Reads use `MGET`; compare-and-set runs as one Lua script so the comparison
//! and both writes are atomic on the server.

use async_trait::async_trait;
use bouncer::rate_limit::{BucketState, BucketStore};
use bouncer::StoreError;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use std::time::Duration;

/// Absent keys compare as `"0"` and `""`. A missing next timestamp deletes the key.
const CAS_SCRIPT: &str = r#"
local count = redis.call('GET', KEYS[1]) or '0'
local last = redis.call('GET', KEYS[2]) or ''
if count ~= ARGV[1] or last ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3])
if ARGV[4] == '' then
  redis.call('DEL', KEYS[2])
else
  redis.call('SET', KEYS[2], ARGV[4])
end
local ttl = tonumber(ARGV[5])
if ttl > 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
  if ARGV[4] ~= '' then
    redis.call('EXPIRE', KEYS[2], ttl)
  end
end
return 1
"#;

#[derive(Clone)]
pub struct RedisBucketStore {
    conn: ConnectionManager,
    script: Script,
    idle_ttl: Option<Duration>,
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore")
            .field("conn", &"<redis::aio::ConnectionManager>")
            .field("idle_ttl", &self.idle_ttl)
            .finish()
    }
}

impl RedisBucketStore {
    /// Wrap an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, script: Script::new(CAS_SCRIPT), idle_ttl: None }
    }

    /// Open a client for `url` and build a reconnecting connection manager.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client).await.map_err(map_redis_error)?;
        Ok(Self::new(conn))
    }

    /// Expire buckets that have not been written for `ttl`. Whole seconds; zero disables.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }
}

fn count_key(key: &str) -> String {
    format!("{key}:count")
}

fn last_leak_key(key: &str) -> String {
    format!("{key}:lastLeak")
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::backend(err)
    }
}

fn parse_state(key: &str, count: Option<String>, last: Option<String>) -> Result<BucketState, StoreError> {
    let count = match count {
        Some(raw) => raw.parse::<u64>().map_err(|e| StoreError::Corrupt {
            key: count_key(key),
            detail: format!("{raw:?}: {e}"),
        })?,
        None => 0,
    };
    let last_leak = match last {
        Some(raw) => Some(raw.parse::<i64>().map_err(|e| StoreError::Corrupt {
            key: last_leak_key(key),
            detail: format!("{raw:?}: {e}"),
        })?),
        None => None,
    };
    Ok(BucketState { count, last_leak })
}

fn encode_last(last: Option<i64>) -> String {
    last.map(|t| t.to_string()).unwrap_or_default()
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn get(&self, key: &str) -> Result<BucketState, StoreError> {
        let mut conn = self.conn.clone();
        let (count, last): (Option<String>, Option<String>) = redis::cmd("MGET")
            .arg(count_key(key))
            .arg(last_leak_key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        parse_state(key, count, last)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: BucketState,
        next: BucketState,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let ttl = self.idle_ttl.map(|t| t.as_secs().max(1)).unwrap_or(0);
        let applied: i64 = self
            .script
            .key(count_key(key))
            .key(last_leak_key(key))
            .arg(expected.count.to_string())
            .arg(encode_last(expected.last_leak))
            .arg(next.count.to_string())
            .arg(encode_last(next.last_leak))
            .arg(ttl)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        if applied == 0 {
            tracing::debug!(target: "bouncer::redis", key, "compare-and-set lost a race");
        }
        Ok(applied == 1)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(count_key(key))
            .arg(last_leak_key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_count_and_last_leak_layout() {
        assert_eq!(count_key("1.2.3.4"), "1.2.3.4:count");
        assert_eq!(last_leak_key("alice"), "alice:lastLeak");
    }

    #[test]
    fn absent_values_decode_as_empty_bucket() {
        assert_eq!(parse_state("k", None, None).unwrap(), BucketState::EMPTY);
        let state = parse_state("k", Some("4".into()), Some("1700000000".into())).unwrap();
        assert_eq!(state, BucketState { count: 4, last_leak: Some(1_700_000_000) });
    }

    #[test]
    fn garbage_values_are_corrupt() {
        let err = parse_state("k", Some("many".into()), None).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "k:count"));
        let err = parse_state("k", None, Some("yesterday".into())).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "k:lastLeak"));
    }

    #[test]
    fn missing_timestamp_encodes_empty() {
        assert_eq!(encode_last(None), "");
        assert_eq!(encode_last(Some(42)), "42");
    }
}
