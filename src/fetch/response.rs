//! Fetch results and header curation.

use std::collections::BTreeMap;

use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::safety::TargetUrl;

/// Response headers kept for analysis. Everything else is dropped so
/// infrastructure details never reach callers.
pub const CURATED_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "content-encoding",
    "cache-control",
    "last-modified",
    "etag",
    "server",
    "x-powered-by",
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
    "referrer-policy",
];

/// Curated response headers keyed by lowercase name.
pub type HeaderSnapshot = BTreeMap<String, String>;

/// Successful plain fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub html: String,
    pub final_url: TargetUrl,
    pub status_code: u16,
    pub headers: HeaderSnapshot,
}

impl FetchResult {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

/// Keep only curated headers from name/value pairs.
pub fn curate_pairs<'a, I>(pairs: I) -> HeaderSnapshot
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            CURATED_HEADERS
                .contains(&name.as_str())
                .then(|| (name, value.to_string()))
        })
        .collect()
}

/// Curate a reqwest header map. Non-UTF-8 values are skipped.
pub fn curate_headers(headers: &HeaderMap) -> HeaderSnapshot {
    curate_pairs(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
}

/// Curate a CDP header object (`{"Name": "value", ...}`).
pub fn curate_json_headers(headers: &serde_json::Value) -> HeaderSnapshot {
    match headers.as_object() {
        Some(map) => curate_pairs(
            map.iter()
                .filter_map(|(name, value)| value.as_str().map(|v| (name.as_str(), v))),
        ),
        None => HeaderSnapshot::new(),
    }
}

/// True for `text/html` and `application/xhtml+xml`, ignoring parameters.
pub fn is_html_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(essence.as_str(), "text/html" | "application/xhtml+xml")
}
