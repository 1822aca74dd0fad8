//! Pluggable backend trait for rate limit storage.
//!
//! Allows swapping between in-memory (single process) and Redis
//! (shared across instances) sliding-window counters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Result type for rate limit operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors from rate limit backend operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Which store produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitProvider {
    Memory,
    Redis,
    /// The configured shared backend failed and the in-process store answered.
    MemoryFallback,
    Disabled,
}

impl RateLimitProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::MemoryFallback => "memory-fallback",
            Self::Disabled => "disabled",
        }
    }
}

/// A named sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub name: &'static str,
    pub limit: u32,
    pub duration: Duration,
}

impl WindowSpec {
    pub fn minute(limit: u32) -> Self {
        Self {
            name: "minute",
            limit,
            duration: Duration::from_secs(60),
        }
    }

    pub fn day(limit: u32) -> Self {
        Self {
            name: "day",
            limit,
            duration: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration.as_millis() as i64
    }
}

/// State of one window after a hit or peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Whether the window had room before this request.
    pub allowed: bool,
    /// Requests counted in the window, including this one if it was allowed.
    pub count: u32,
    /// Timestamp of the oldest request still in the window.
    pub oldest_ms: Option<i64>,
}

impl WindowOutcome {
    pub fn remaining(&self, window: &WindowSpec) -> u32 {
        window.limit.saturating_sub(self.count)
    }

    /// When the oldest counted request leaves the window.
    pub fn reset_at_ms(&self, window: &WindowSpec, now_ms: i64) -> i64 {
        self.oldest_ms.unwrap_or(now_ms) + window.duration_ms()
    }
}

/// Storage for sliding-window request timestamps.
///
/// Implementations must prune timestamps older than the window before
/// counting, so a pruned request never counts again.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    fn provider(&self) -> RateLimitProvider;

    /// Count the window and, if it has room, record a request at `now_ms`.
    async fn hit(&self, key: &str, window: &WindowSpec, now_ms: i64)
        -> RateLimitResult<WindowOutcome>;

    /// Count the window without recording anything.
    async fn peek(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
    ) -> RateLimitResult<WindowOutcome>;

    /// Drop keys whose windows hold no live requests. Returns how many went.
    async fn cleanup_expired(&self, now_ms: i64) -> RateLimitResult<u64>;
}

/// Type alias for a shared backend.
pub type BoxedRateLimitBackend = Arc<dyn RateLimitBackend>;
