//! Service settings.
//!
//! Settings come from an optional TOML (or JSON) file, then environment
//! variables override individual fields. `.env` is loaded by the binary
//! before anything reads the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::browser::BrowserEngineConfig;
use crate::fetch::FetchConfig;
use crate::rate_limit::RateLimitConfig;
use crate::safety::DnsConfig;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "siteaudit.toml";

/// Default bind address for the HTTP server.
pub const DEFAULT_BIND: &str = "127.0.0.1:3030";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Audits allowed to run at once. Values below 1 are treated as 1.
    pub max_concurrent: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind: String,
    pub fetch: FetchConfig,
    pub dns: DnsConfig,
    pub admission: AdmissionConfig,
    pub rate_limit: RateLimitConfig,
    pub browser: BrowserEngineConfig,
    /// How often idle rate-limit windows are swept, in seconds.
    pub cleanup_interval_secs: u64,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            fetch: FetchConfig::default(),
            dns: DnsConfig::default(),
            admission: AdmissionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            browser: BrowserEngineConfig::default(),
            cleanup_interval_secs: 300,
            source_path: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from `siteaudit.toml` in the working
    /// directory when it exists, then apply environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self, String> {
        let settings = match path {
            Some(path) => Self::load_from_path(path).await?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if tokio::fs::try_exists(fallback).await.unwrap_or(false) {
                    Self::load_from_path(fallback).await?
                } else {
                    Self::default()
                }
            }
        };
        Ok(settings.with_env_overrides())
    }

    /// Load settings from a specific file. TOML unless the extension says
    /// JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

        let mut settings: Settings = match ext {
            "json" => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
            _ => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
        };

        settings.source_path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source. Empty values are ignored.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        if let Some(bind) = var("SITEAUDIT_BIND") {
            self.bind = bind;
        }
        if let Some(user_agent) = var("SITEAUDIT_USER_AGENT") {
            self.fetch.user_agent = Some(user_agent);
        }
        if let Some(max) = var("SITEAUDIT_MAX_CONCURRENT") {
            match max.trim().parse() {
                Ok(max) => self.admission.max_concurrent = max,
                Err(_) => tracing::warn!("Ignoring invalid SITEAUDIT_MAX_CONCURRENT: {}", max),
            }
        }
        if let Some(enabled) = var("SITEAUDIT_RATE_LIMIT") {
            self.rate_limit.enabled = !matches!(
                enabled.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        if let Some(per_minute) = var("SITEAUDIT_RATE_PER_MINUTE") {
            match per_minute.trim().parse() {
                Ok(n) => self.rate_limit.per_minute = n,
                Err(_) => tracing::warn!("Ignoring invalid SITEAUDIT_RATE_PER_MINUTE: {}", per_minute),
            }
        }
        if let Some(per_day) = var("SITEAUDIT_RATE_PER_DAY") {
            match per_day.trim().parse() {
                Ok(n) => self.rate_limit.per_day = n,
                Err(_) => tracing::warn!("Ignoring invalid SITEAUDIT_RATE_PER_DAY: {}", per_day),
            }
        }
        if let Some(redis_url) = var("REDIS_URL") {
            tracing::debug!("Using REDIS_URL from environment for rate limiting");
            self.rate_limit.backend = Some(redis_url);
        }
        if let Some(chrome) = var("CHROME_PATH") {
            self.browser.chrome_path = Some(PathBuf::from(chrome));
        }

        self
    }
}
