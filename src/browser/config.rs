//! Browser engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Settings for the headless renderer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    pub headless: bool,

    /// Chrome executable. Searched for in common locations when unset.
    pub chrome_path: Option<PathBuf>,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,

    /// Budget for navigation and the ready-state wait, in seconds.
    pub navigation_timeout_secs: u64,

    /// Extra time for client-side rendering after the document is ready.
    pub settle_ms: u64,

    /// Request URLs kept per render.
    pub max_captured_requests: usize,

    /// Custom user agent, or "browser" for a desktop Chrome string.
    pub user_agent: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            chrome_args: Vec::new(),
            navigation_timeout_secs: 20,
            settle_ms: 1500,
            max_captured_requests: 300,
            user_agent: Some("browser".to_string()),
        }
    }
}

impl BrowserEngineConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
