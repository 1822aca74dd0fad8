//! Headless browser rendering for deep technology detection.
//!
//! Each render launches a fresh Chrome with request interception enabled.
//! Every outbound request is classified before it leaves the browser, and
//! the page's final URL is checked again after navigation settles.
//!
//! Without the `browser` feature [`RenderingFetcher::render_and_capture`]
//! returns [`RenderError::Unavailable`].

mod config;
mod guard;
#[cfg(feature = "browser")]
mod render;
#[cfg(feature = "browser")]
mod session;
mod signals;
mod types;

pub use config::BrowserEngineConfig;
pub use guard::{
    BlockReason, CaptureLog, FinalUrlCheck, InterceptDecision, RequestGuard, ResourceKind,
};
pub use signals::{JsSignals, JS_SIGNALS_SCRIPT};
pub use types::{assess_content, RenderError, RenderedResult, MIN_RENDERED_HTML_CHARS};

use std::sync::Arc;

use crate::safety::{DnsSafetyResolver, TargetUrl};

/// Renders pages in an isolated headless browser.
pub struct RenderingFetcher {
    config: BrowserEngineConfig,
    guard: RequestGuard,
}

impl RenderingFetcher {
    pub fn new(config: BrowserEngineConfig, dns: Arc<DnsSafetyResolver>) -> Self {
        Self {
            config,
            guard: RequestGuard::new(dns),
        }
    }

    /// Whether this build can launch a browser at all.
    pub fn is_available() -> bool {
        cfg!(feature = "browser")
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }

    pub fn guard(&self) -> &RequestGuard {
        &self.guard
    }
}

#[cfg(feature = "browser")]
impl RenderingFetcher {
    /// Render a vetted URL and collect markup, requests and JS signals.
    ///
    /// The browser is closed before this returns, whatever the outcome. If
    /// the future is dropped mid-render the session's drop kills the process.
    pub async fn render_and_capture(&self, url: &TargetUrl) -> Result<RenderedResult, RenderError> {
        let session = session::BrowserSession::launch(&self.config).await?;
        let result = render::render(&session, &self.config, &self.guard, url).await;
        session.shutdown().await;
        result
    }
}

#[cfg(not(feature = "browser"))]
impl RenderingFetcher {
    pub async fn render_and_capture(
        &self,
        _url: &TargetUrl,
    ) -> Result<RenderedResult, RenderError> {
        Err(RenderError::Unavailable)
    }
}
