//! Rate limit configuration.

use serde::Deserialize;

use super::backend::WindowSpec;

/// Per-client audit limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub per_minute: u32,
    pub per_day: u32,
    /// Backend URL. `None` or "memory" for in-process, `redis://...` for Redis.
    pub backend: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: 5,
            per_day: 50,
            backend: None,
        }
    }
}

impl RateLimitConfig {
    pub fn minute_window(&self) -> WindowSpec {
        WindowSpec::minute(self.per_minute)
    }

    pub fn day_window(&self) -> WindowSpec {
        WindowSpec::day(self.per_day)
    }

    /// Redis URL when one is configured.
    pub fn redis_url(&self) -> Option<&str> {
        self.backend
            .as_deref()
            .filter(|b| b.starts_with("redis://") || b.starts_with("rediss://"))
    }
}
