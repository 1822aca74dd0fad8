//! Rendered page results and failures.

use serde::Serialize;

use crate::fetch::HeaderSnapshot;

use super::signals::JsSignals;

/// Rendered documents shorter than this are treated as empty.
pub const MIN_RENDERED_HTML_CHARS: usize = 100;

/// Output of a headless render.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedResult {
    pub html: String,
    pub final_url: String,
    /// Request URLs the page made, capped.
    pub captured_requests: Vec<String>,
    pub js_signals: JsSignals,
    pub cookie_names: Vec<String>,
    /// Curated headers of the main document response.
    pub main_response_headers: HeaderSnapshot,
    /// Navigation ran out of time but enough content had loaded to use.
    pub partial: bool,
    /// Requests refused because they targeted unsafe destinations.
    pub blocked_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("Browser rendering is not available in this build")]
    Unavailable,
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("Rendering timed out before the page produced content")]
    Timeout,
    #[error("Page redirected to a private or local address")]
    UnsafeRedirect,
    #[error("Rendered page was empty")]
    EmptyContent,
}

/// Decide whether rendered markup is usable.
///
/// A navigation timeout is only fatal when nothing usable loaded.
pub fn assess_content(html: &str, navigation_timed_out: bool) -> Result<(), RenderError> {
    if html.trim().chars().count() >= MIN_RENDERED_HTML_CHARS {
        return Ok(());
    }
    if navigation_timed_out {
        Err(RenderError::Timeout)
    } else {
        Err(RenderError::EmptyContent)
    }
}
