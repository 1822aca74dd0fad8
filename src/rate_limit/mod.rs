//! Per-client rate limiting for audit requests.
//!
//! Two sliding windows (per minute and per day) guard each client. Storage
//! is pluggable:
//! - In-memory: single process, not persisted
//! - Redis: shared across instances (requires `redis-backend` feature)

mod backend;
mod client;
mod config;
mod limiter;
mod memory;
#[cfg(feature = "redis-backend")]
mod redis;

pub use backend::{
    BoxedRateLimitBackend, RateLimitBackend, RateLimitError, RateLimitProvider, RateLimitResult,
    WindowOutcome, WindowSpec,
};
pub use client::client_key;
pub use config::RateLimitConfig;
pub use limiter::{
    spawn_cleanup_task, RateLimitDecision, RateLimiter, DAILY_LIMIT_MESSAGE,
    MINUTE_LIMIT_MESSAGE,
};
pub use memory::InMemoryRateLimitBackend;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisRateLimitBackend;
