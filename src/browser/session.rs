//! Browser process lifecycle.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::config::BrowserEngineConfig;
use super::types::RenderError;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Chrome found on disk or in PATH, kept for the life of the process.
static DISCOVERED_CHROME: OnceLock<PathBuf> = OnceLock::new();

/// Find a Chrome executable, preferring the configured path.
///
/// Blocking: the PATH search spawns `which`. Async callers go through
/// [`locate_chrome`].
pub(super) fn find_chrome(config: &BrowserEngineConfig) -> Result<PathBuf, RenderError> {
    if let Some(path) = &config.chrome_path {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(RenderError::Launch(format!(
            "configured Chrome path {} does not exist",
            path.display()
        )));
    }

    if let Some(path) = DISCOVERED_CHROME.get() {
        return Ok(path.clone());
    }

    let path = discover_chrome().ok_or_else(|| {
        RenderError::Launch("Chrome/Chromium not found; install it or set CHROME_PATH".to_string())
    })?;
    Ok(DISCOVERED_CHROME.get_or_init(|| path).clone())
}

fn discover_chrome() -> Option<PathBuf> {
    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            debug!("Found Chrome at: {}", path);
            return Some(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    debug!("Found Chrome in PATH: {}", path);
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    None
}

/// [`find_chrome`] on the blocking pool. A cached discovery skips the pool.
pub(super) async fn locate_chrome(config: &BrowserEngineConfig) -> Result<PathBuf, RenderError> {
    if config.chrome_path.is_none() {
        if let Some(path) = DISCOVERED_CHROME.get() {
            return Ok(path.clone());
        }
    }

    let config = config.clone();
    tokio::task::spawn_blocking(move || find_chrome(&config))
        .await
        .map_err(|e| RenderError::Launch(format!("Chrome lookup failed: {}", e)))?
}

/// One browser process with its own throwaway profile.
///
/// Nothing is shared between sessions, so cookies and cache from one audit
/// never leak into the next.
pub(super) struct BrowserSession {
    pub browser: Browser,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl BrowserSession {
    pub async fn launch(config: &BrowserEngineConfig) -> Result<Self, RenderError> {
        let chrome_path = locate_chrome(config).await?;
        let profile = tempfile::Builder::new()
            .prefix("siteaudit-chrome-")
            .tempdir()
            .map_err(|e| RenderError::Launch(format!("profile directory: {}", e)))?;

        info!("Launching browser (headless={})", config.headless);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile.path())
            .enable_request_intercept()
            .disable_cache()
            .request_timeout(config.navigation_timeout());

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--disable-extensions")
            .arg("--metrics-recording-only")
            .arg("--safebrowsing-disable-auto-update")
            .arg("--no-sandbox") // Often needed for headless in containers
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| RenderError::Launch(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            _profile: profile,
        })
    }

    /// Close the browser and wait for the process to exit.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser wait failed: {}", e);
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Browser's own Drop kills the child when shutdown was skipped
        self.handler.abort();
    }
}
