//! Dual-window per-client rate limiter.
//!
//! Every audit request is checked against a per-minute and a per-day sliding
//! window. A shared backend can be plugged in; if it errors, the in-process
//! store answers instead so a Redis outage degrades to per-instance limits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::backend::{
    BoxedRateLimitBackend, RateLimitBackend, RateLimitProvider, WindowOutcome, WindowSpec,
};
use super::config::RateLimitConfig;
use super::memory::InMemoryRateLimitBackend;

pub const MINUTE_LIMIT_MESSAGE: &str =
    "Too many audit requests. Please wait a minute before trying again.";
pub const DAILY_LIMIT_MESSAGE: &str = "Daily audit limit reached. Please try again tomorrow.";

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    pub provider: RateLimitProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RateLimitDecision {
    /// Decision returned when limiting is turned off.
    pub fn disabled() -> Self {
        Self {
            allowed: true,
            limit: 0,
            remaining: 0,
            reset_at: DateTime::<Utc>::default(),
            retry_after_seconds: None,
            provider: RateLimitProvider::Disabled,
            reason: None,
        }
    }

    fn from_window(
        window: &WindowSpec,
        outcome: WindowOutcome,
        provider: RateLimitProvider,
        now_ms: i64,
        reason: Option<&str>,
    ) -> Self {
        let reset_ms = outcome.reset_at_ms(window, now_ms);
        let retry_after_seconds = (!outcome.allowed)
            .then(|| ((reset_ms - now_ms).max(0) as u64).div_ceil(1000).max(1));

        Self {
            allowed: outcome.allowed,
            limit: window.limit,
            remaining: outcome.remaining(window),
            reset_at: DateTime::<Utc>::from_timestamp_millis(reset_ms).unwrap_or_default(),
            retry_after_seconds,
            provider,
            reason: reason.map(str::to_string),
        }
    }
}

/// Per-client limiter over a minute window and a day window.
pub struct RateLimiter {
    config: RateLimitConfig,
    backend: Option<BoxedRateLimitBackend>,
    fallback: InMemoryRateLimitBackend,
}

impl RateLimiter {
    /// In-process limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            backend: None,
            fallback: InMemoryRateLimitBackend::new(),
        }
    }

    /// Limiter over a shared backend, falling back to memory on errors.
    pub fn with_backend(config: RateLimitConfig, backend: BoxedRateLimitBackend) -> Self {
        Self {
            config,
            backend: Some(backend),
            fallback: InMemoryRateLimitBackend::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    /// Build from configuration, connecting to Redis when one is configured.
    pub async fn from_config(config: RateLimitConfig) -> Self {
        if !config.enabled {
            info!("Rate limiting disabled");
            return Self::new(config);
        }

        match connect_shared_backend(&config).await {
            Some(backend) => Self::with_backend(config, backend),
            None => Self::new(config),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Backend that answers when nothing fails.
    pub fn provider(&self) -> RateLimitProvider {
        match (&self.backend, self.config.enabled) {
            (_, false) => RateLimitProvider::Disabled,
            (Some(backend), true) => backend.provider(),
            (None, true) => RateLimitProvider::Memory,
        }
    }

    /// Count a request against both windows.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Utc::now()).await
    }

    /// [`check`](Self::check) at an explicit time.
    ///
    /// The minute window is checked first; a request it denies is not counted
    /// against the day window. When both allow, the day window's numbers are
    /// reported.
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::disabled();
        }
        let now_ms = now.timestamp_millis();

        let minute = self.config.minute_window();
        let (outcome, provider) = self.hit(key, &minute, now_ms).await;
        if !outcome.allowed {
            return RateLimitDecision::from_window(
                &minute,
                outcome,
                provider,
                now_ms,
                Some(MINUTE_LIMIT_MESSAGE),
            );
        }

        let day = self.config.day_window();
        let (outcome, provider) = self.hit(key, &day, now_ms).await;
        let reason = (!outcome.allowed).then_some(DAILY_LIMIT_MESSAGE);
        RateLimitDecision::from_window(&day, outcome, provider, now_ms, reason)
    }

    /// Current standing without counting a request.
    pub async fn status(&self, key: &str) -> RateLimitDecision {
        self.status_at(key, Utc::now()).await
    }

    pub async fn status_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::disabled();
        }
        let now_ms = now.timestamp_millis();

        let minute = self.config.minute_window();
        let (outcome, provider) = self.peek(key, &minute, now_ms).await;
        if !outcome.allowed {
            return RateLimitDecision::from_window(
                &minute,
                outcome,
                provider,
                now_ms,
                Some(MINUTE_LIMIT_MESSAGE),
            );
        }

        let day = self.config.day_window();
        let (outcome, provider) = self.peek(key, &day, now_ms).await;
        let reason = (!outcome.allowed).then_some(DAILY_LIMIT_MESSAGE);
        RateLimitDecision::from_window(&day, outcome, provider, now_ms, reason)
    }

    /// Drop idle keys from whichever stores are in use.
    pub async fn cleanup_expired(&self) -> u64 {
        let now_ms = Utc::now().timestamp_millis();
        let mut removed = self.fallback.cleanup_expired(now_ms).await.unwrap_or_default();
        if let Some(backend) = &self.backend {
            match backend.cleanup_expired(now_ms).await {
                Ok(n) => removed += n,
                Err(e) => warn!("Rate limit cleanup failed: {}", e),
            }
        }
        removed
    }

    async fn hit(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
    ) -> (WindowOutcome, RateLimitProvider) {
        if let Some(backend) = &self.backend {
            match backend.hit(key, window, now_ms).await {
                Ok(outcome) => return (outcome, backend.provider()),
                Err(e) => warn!("Rate limit backend failed, using in-process fallback: {}", e),
            }
            return (
                self.fallback.record(key, window, now_ms).await,
                RateLimitProvider::MemoryFallback,
            );
        }
        (
            self.fallback.record(key, window, now_ms).await,
            RateLimitProvider::Memory,
        )
    }

    async fn peek(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
    ) -> (WindowOutcome, RateLimitProvider) {
        if let Some(backend) = &self.backend {
            match backend.peek(key, window, now_ms).await {
                Ok(outcome) => return (outcome, backend.provider()),
                Err(e) => warn!("Rate limit backend failed, using in-process fallback: {}", e),
            }
            return (
                self.fallback.count(key, window, now_ms).await,
                RateLimitProvider::MemoryFallback,
            );
        }
        (
            self.fallback.count(key, window, now_ms).await,
            RateLimitProvider::Memory,
        )
    }
}

#[cfg(feature = "redis-backend")]
async fn connect_shared_backend(config: &RateLimitConfig) -> Option<BoxedRateLimitBackend> {
    let url = config.redis_url()?;
    match super::redis::RedisRateLimitBackend::new(url).await {
        Ok(backend) => {
            info!("Using Redis rate limit backend");
            Some(Arc::new(backend))
        }
        Err(e) => {
            warn!("Redis rate limit backend unavailable, using memory: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "redis-backend"))]
async fn connect_shared_backend(config: &RateLimitConfig) -> Option<BoxedRateLimitBackend> {
    if config.redis_url().is_some() {
        warn!("Redis rate limiting requires the redis-backend feature, using memory");
    }
    None
}

/// Periodically drop idle rate limit keys until the limiter is dropped.
pub fn spawn_cleanup_task(
    limiter: &Arc<RateLimiter>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    let weak = Arc::downgrade(limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(limiter) = weak.upgrade() else {
                break;
            };
            let removed = limiter.cleanup_expired().await;
            if removed > 0 {
                tracing::debug!("Removed {} idle rate limit keys", removed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::backend::{RateLimitError, RateLimitResult};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    struct FailingBackend;

    #[async_trait]
    impl RateLimitBackend for FailingBackend {
        fn provider(&self) -> RateLimitProvider {
            RateLimitProvider::Redis
        }

        async fn hit(&self, _: &str, _: &WindowSpec, _: i64) -> RateLimitResult<WindowOutcome> {
            Err(RateLimitError::Unavailable("connection refused".into()))
        }

        async fn peek(&self, _: &str, _: &WindowSpec, _: i64) -> RateLimitResult<WindowOutcome> {
            Err(RateLimitError::Unavailable("connection refused".into()))
        }

        async fn cleanup_expired(&self, _: i64) -> RateLimitResult<u64> {
            Err(RateLimitError::Unavailable("connection refused".into()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn limiter(per_minute: u32, per_day: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            per_minute,
            per_day,
            backend: None,
        })
    }

    #[tokio::test]
    async fn test_minute_window_denies_after_limit() {
        let limiter = limiter(3, 50);
        for i in 0..3 {
            let decision = limiter.check_at("client", t0() + Duration::seconds(i)).await;
            assert!(decision.allowed);
            assert_eq!(decision.provider, RateLimitProvider::Memory);
        }

        let denied = limiter.check_at("client", t0() + Duration::seconds(3)).await;
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 3);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reason.as_deref(), Some(MINUTE_LIMIT_MESSAGE));
        assert_eq!(denied.reset_at, t0() + Duration::seconds(60));
        assert_eq!(denied.retry_after_seconds, Some(57));
    }

    #[tokio::test]
    async fn test_minute_window_slides_open() {
        let limiter = limiter(3, 50);
        for i in 0..3 {
            limiter.check_at("client", t0() + Duration::seconds(i)).await;
        }
        assert!(!limiter.check_at("client", t0() + Duration::seconds(30)).await.allowed);
        assert!(limiter.check_at("client", t0() + Duration::seconds(61)).await.allowed);
    }

    #[tokio::test]
    async fn test_allowed_reports_day_window() {
        let limiter = limiter(5, 10);
        let decision = limiter.check_at("client", t0()).await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.reset_at, t0() + Duration::days(1));
        assert_eq!(decision.retry_after_seconds, None);
    }

    #[tokio::test]
    async fn test_day_window_denies_across_minutes() {
        let limiter = limiter(100, 2);
        assert!(limiter.check_at("client", t0()).await.allowed);
        assert!(limiter.check_at("client", t0() + Duration::minutes(10)).await.allowed);

        let denied = limiter.check_at("client", t0() + Duration::minutes(20)).await;
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 2);
        assert_eq!(denied.reason.as_deref(), Some(DAILY_LIMIT_MESSAGE));
        assert_eq!(denied.reset_at, t0() + Duration::days(1));

        assert!(limiter.check_at("client", t0() + Duration::hours(25)).await.allowed);
    }

    #[tokio::test]
    async fn test_clients_limited_independently() {
        let limiter = limiter(1, 50);
        assert!(limiter.check_at("a", t0()).await.allowed);
        assert!(!limiter.check_at("a", t0()).await.allowed);
        assert!(limiter.check_at("b", t0()).await.allowed);
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_allows() {
        let limiter = RateLimiter::disabled();
        for _ in 0..100 {
            let decision = limiter.check("client").await;
            assert!(decision.allowed);
            assert_eq!(decision.provider, RateLimitProvider::Disabled);
            assert_eq!(decision.limit, 0);
            assert_eq!(decision.remaining, 0);
            assert_eq!(decision.reset_at.timestamp(), 0);
        }
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_memory() {
        let config = RateLimitConfig {
            per_minute: 1,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::with_backend(config, Arc::new(FailingBackend));
        assert_eq!(limiter.provider(), RateLimitProvider::Redis);

        let first = limiter.check_at("client", t0()).await;
        assert!(first.allowed);
        assert_eq!(first.provider, RateLimitProvider::MemoryFallback);

        let second = limiter.check_at("client", t0()).await;
        assert!(!second.allowed);
        assert_eq!(second.provider, RateLimitProvider::MemoryFallback);
    }

    #[tokio::test]
    async fn test_status_does_not_consume() {
        let limiter = limiter(1, 50);
        for _ in 0..3 {
            assert!(limiter.status_at("client", t0()).await.allowed);
        }
        assert!(limiter.check_at("client", t0()).await.allowed);

        let status = limiter.status_at("client", t0()).await;
        assert!(!status.allowed);
        assert_eq!(status.reason.as_deref(), Some(MINUTE_LIMIT_MESSAGE));
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let json = serde_json::to_value(RateLimitDecision::disabled()).expect("json");
        assert_eq!(json["provider"], "disabled");
        assert!(json.get("resetAt").is_some());
        assert!(json.get("retryAfterSeconds").is_none());
    }
}
