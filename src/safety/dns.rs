//! DNS safety resolution with a bounded TTL cache.
//!
//! A hostname is safe only when every address it resolves to is public.
//! Lookup failures and timeouts count as unsafe and are cached for a shorter
//! period than successful verdicts.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::address::{classify, classify_ip, normalize_host};

/// Source of address records for a hostname.
#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

#[async_trait]
impl HostLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut ips: Vec<IpAddr> = tokio::net::lookup_host((host, 0u16))
            .await?
            .map(|addr| addr.ip())
            .collect();
        ips.sort();
        ips.dedup();
        Ok(ips)
    }
}

/// Cache and lookup tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Seconds a successful verdict stays cached.
    pub safe_ttl_secs: u64,
    /// Seconds a failed lookup stays cached as unsafe.
    pub failure_ttl_secs: u64,
    pub max_entries: usize,
    pub lookup_timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            safe_ttl_secs: 60,
            failure_ttl_secs: 30,
            max_entries: 1000,
            lookup_timeout_secs: 5,
        }
    }
}

/// Returned when a host cannot be used as an outbound destination.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{host} resolves to a private or unreachable address")]
pub struct UnsafeHost {
    pub host: String,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    resolves_to_private: bool,
    inserted_at: Instant,
    expires_at: Instant,
}

/// Resolves hostnames and decides whether they are safe to contact.
pub struct DnsSafetyResolver {
    lookup: Arc<dyn HostLookup>,
    config: DnsConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl DnsSafetyResolver {
    pub fn new(config: DnsConfig) -> Self {
        Self::with_lookup(Arc::new(SystemLookup), config)
    }

    pub fn with_lookup(lookup: Arc<dyn HostLookup>, config: DnsConfig) -> Self {
        Self {
            lookup,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// True if the hostname is not literally private and every resolved
    /// address is public.
    ///
    /// Literal IPs are classified directly and never cached. Names are
    /// resolved at most once per TTL; concurrent misses for the same name may
    /// each perform a lookup.
    pub async fn is_hostname_safe(&self, hostname: &str) -> bool {
        let host = normalize_host(hostname);
        if classify(&host).is_private {
            return false;
        }
        if host.parse::<IpAddr>().is_ok() {
            return true;
        }

        let now = Instant::now();
        if let Some(cached) = self.cached(&host, now).await {
            return !cached;
        }

        let (resolves_to_private, ttl) = match self.resolve(&host).await {
            Ok(ips) => (
                ips.iter().any(|ip| classify_ip(*ip).is_private),
                self.safe_ttl(),
            ),
            Err(e) => {
                debug!("DNS lookup for {} failed: {}", host, e);
                (true, self.failure_ttl())
            }
        };

        if resolves_to_private {
            debug!("Host {} resolves to a private address", host);
        }
        self.store(host, resolves_to_private, ttl).await;
        !resolves_to_private
    }

    /// Resolve without the cache and return the addresses only if all are public.
    ///
    /// Used at connect time so the addresses checked are the addresses dialed.
    pub async fn resolve_public(&self, hostname: &str) -> Result<Vec<IpAddr>, UnsafeHost> {
        let host = normalize_host(hostname);
        let unsafe_host = || UnsafeHost { host: host.clone() };

        if classify(&host).is_private {
            return Err(unsafe_host());
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let ips = self.resolve(&host).await.map_err(|e| {
            debug!("Connect-time lookup for {} failed: {}", host, e);
            unsafe_host()
        })?;
        if ips.iter().any(|ip| classify_ip(*ip).is_private) {
            return Err(unsafe_host());
        }
        Ok(ips)
    }

    /// Number of live or not yet pruned cache entries.
    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let timeout = Duration::from_secs(self.config.lookup_timeout_secs);
        match tokio::time::timeout(timeout, self.lookup.lookup(host)).await {
            Ok(Ok(ips)) if ips.is_empty() => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no address records",
            )),
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "DNS lookup timed out",
            )),
        }
    }

    async fn cached(&self, host: &str, now: Instant) -> Option<bool> {
        let mut cache = self.cache.lock().await;
        cache.retain(|_, entry| entry.expires_at > now);
        cache.get(host).map(|entry| entry.resolves_to_private)
    }

    async fn store(&self, host: String, resolves_to_private: bool, ttl: Duration) {
        let now = Instant::now();
        let mut cache = self.cache.lock().await;

        if cache.len() >= self.config.max_entries && !cache.contains_key(&host) {
            evict_oldest(&mut cache, self.config.max_entries);
        }

        cache.insert(
            host,
            CacheEntry {
                resolves_to_private,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
    }

    fn safe_ttl(&self) -> Duration {
        Duration::from_secs(self.config.safe_ttl_secs)
    }

    fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.config.failure_ttl_secs)
    }
}

/// Drop the oldest quarter of entries by insertion time.
fn evict_oldest(cache: &mut HashMap<String, CacheEntry>, max_entries: usize) {
    let evict = (max_entries / 4).max(1);
    let mut by_age: Vec<(String, Instant)> = cache
        .iter()
        .map(|(host, entry)| (host.clone(), entry.inserted_at))
        .collect();
    by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
    for (host, _) in by_age.into_iter().take(evict) {
        cache.remove(&host);
    }
}
