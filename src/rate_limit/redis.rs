//! Redis-backed rate limiter for coordination across instances.
//!
//! Each key/window pair is a sorted set of request timestamps. A Lua script
//! prunes, counts and appends atomically, and keys expire with their window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use super::backend::{
    RateLimitBackend, RateLimitError, RateLimitProvider, RateLimitResult, WindowOutcome,
    WindowSpec,
};

/// Key prefix for rate limit data in Redis.
const KEY_PREFIX: &str = "siteaudit:ratelimit:";

/// Returns {allowed, count, oldest_ms or -1}.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]
local record = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)
local count = redis.call('ZCARD', key)

local allowed = 0
if count < limit then
    allowed = 1
    if record == 1 then
        redis.call('ZADD', key, now_ms, member)
        redis.call('PEXPIRE', key, window_ms)
        count = count + 1
    end
end

local oldest_ms = -1
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    oldest_ms = tonumber(oldest[2])
end

return {allowed, count, oldest_ms}
"#;

/// Redis-backed sliding-window storage.
#[derive(Clone)]
pub struct RedisRateLimitBackend {
    conn: ConnectionManager,
    script: Arc<Script>,
    sequence: Arc<AtomicU64>,
}

impl RedisRateLimitBackend {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn new(redis_url: &str) -> RateLimitResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RateLimitError::Database(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            RateLimitError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self {
            conn,
            script: Arc::new(Script::new(SLIDING_WINDOW_SCRIPT)),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    fn window_key(key: &str, window: &WindowSpec) -> String {
        format!("{}{}:{}", KEY_PREFIX, window.name, key)
    }

    async fn run(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
        record: bool,
    ) -> RateLimitResult<WindowOutcome> {
        let mut conn = self.conn.clone();
        // Sorted set members must be unique or concurrent hits collapse
        let member = format!(
            "{}-{}",
            now_ms,
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );

        let reply: Vec<i64> = self
            .script
            .key(Self::window_key(key, window))
            .arg(now_ms)
            .arg(window.duration_ms())
            .arg(window.limit)
            .arg(member)
            .arg(i64::from(record))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Database(e.to_string()))?;

        match reply.as_slice() {
            [allowed, count, oldest] => Ok(WindowOutcome {
                allowed: *allowed == 1,
                count: (*count).max(0) as u32,
                oldest_ms: (*oldest >= 0).then_some(*oldest),
            }),
            _ => Err(RateLimitError::Database(format!(
                "unexpected script reply: {:?}",
                reply
            ))),
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimitBackend {
    fn provider(&self) -> RateLimitProvider {
        RateLimitProvider::Redis
    }

    async fn hit(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
    ) -> RateLimitResult<WindowOutcome> {
        self.run(key, window, now_ms, true).await
    }

    async fn peek(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
    ) -> RateLimitResult<WindowOutcome> {
        self.run(key, window, now_ms, false).await
    }

    async fn cleanup_expired(&self, _now_ms: i64) -> RateLimitResult<u64> {
        // Keys carry a PEXPIRE equal to their window
        Ok(0)
    }
}
