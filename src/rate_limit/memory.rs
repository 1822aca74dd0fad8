//! In-memory rate limit backend for single-process operation.
//!
//! State is not persisted across restarts and is not shared between
//! instances.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::{
    RateLimitBackend, RateLimitProvider, RateLimitResult, WindowOutcome, WindowSpec,
};

#[derive(Debug)]
struct WindowEntry {
    duration_ms: i64,
    /// Request timestamps in non-decreasing order.
    stamps: VecDeque<i64>,
}

impl WindowEntry {
    fn new(window: &WindowSpec) -> Self {
        Self {
            duration_ms: window.duration_ms(),
            stamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.duration_ms;
        while self.stamps.front().is_some_and(|&t| t <= cutoff) {
            self.stamps.pop_front();
        }
    }

    fn outcome(&self, allowed: bool) -> WindowOutcome {
        WindowOutcome {
            allowed,
            count: self.stamps.len() as u32,
            oldest_ms: self.stamps.front().copied(),
        }
    }
}

/// In-memory sliding-window backend.
#[derive(Clone, Default)]
pub struct InMemoryRateLimitBackend {
    windows: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_key(key: &str, window: &WindowSpec) -> String {
        format!("{}:{}", window.name, key)
    }

    /// Infallible form of [`RateLimitBackend::hit`].
    pub async fn record(&self, key: &str, window: &WindowSpec, now_ms: i64) -> WindowOutcome {
        let mut windows = self.windows.lock().await;
        let entry = windows
            .entry(Self::entry_key(key, window))
            .or_insert_with(|| WindowEntry::new(window));
        entry.prune(now_ms);

        if entry.stamps.len() as u32 >= window.limit {
            return entry.outcome(false);
        }

        // Keep the deque ordered even if the caller's clock steps backwards
        let stamp = entry.stamps.back().map_or(now_ms, |&last| last.max(now_ms));
        entry.stamps.push_back(stamp);
        entry.outcome(true)
    }

    /// Infallible form of [`RateLimitBackend::peek`].
    pub async fn count(&self, key: &str, window: &WindowSpec, now_ms: i64) -> WindowOutcome {
        let mut windows = self.windows.lock().await;
        match windows.get_mut(&Self::entry_key(key, window)) {
            Some(entry) => {
                entry.prune(now_ms);
                let allowed = (entry.stamps.len() as u32) < window.limit;
                entry.outcome(allowed)
            }
            None => WindowOutcome {
                allowed: window.limit > 0,
                count: 0,
                oldest_ms: None,
            },
        }
    }

    /// Number of tracked key/window pairs.
    pub async fn len(&self) -> usize {
        self.windows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    fn provider(&self) -> RateLimitProvider {
        RateLimitProvider::Memory
    }

    async fn hit(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
    ) -> RateLimitResult<WindowOutcome> {
        Ok(self.record(key, window, now_ms).await)
    }

    async fn peek(
        &self,
        key: &str,
        window: &WindowSpec,
        now_ms: i64,
    ) -> RateLimitResult<WindowOutcome> {
        Ok(self.count(key, window, now_ms).await)
    }

    async fn cleanup_expired(&self, now_ms: i64) -> RateLimitResult<u64> {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, entry| {
            entry.prune(now_ms);
            !entry.stamps.is_empty()
        });
        Ok((before - windows.len()) as u64)
    }
}
