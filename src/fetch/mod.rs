//! Plain HTTP fetching of audit targets.
//!
//! Redirects are followed by hand so every hop can be checked before it is
//! requested. The client also resolves through [`GuardedDnsResolver`], which
//! refuses private answers at connect time.

mod resolver;
mod response;
mod user_agent;

pub use resolver::GuardedDnsResolver;
pub use response::{
    curate_headers, curate_json_headers, is_html_content_type, FetchResult, HeaderSnapshot,
    CURATED_HEADERS,
};
pub use user_agent::{resolve_user_agent, BROWSER_USER_AGENT, USER_AGENT};

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, LOCATION};
use reqwest::{redirect, Client, Response};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::safety::{classify, RejectionReason, TargetUrl, UnsafeHost, UrlValidator};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.1";

/// Plain fetch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total time budget for a fetch including redirects and body.
    pub timeout_secs: u64,
    pub max_response_bytes: usize,
    pub max_redirects: usize,
    /// Run the full validator (literal and DNS) on every redirect hop.
    /// When false, hops get the scheme check and the literal address check.
    /// Hostnames are then left to the connect-time resolver, which is never
    /// consulted for IP literals.
    pub revalidate_redirects: bool,
    /// Custom user agent, or "browser" for a desktop Chrome string.
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_response_bytes: 5 * 1024 * 1024,
            max_redirects: 5,
            revalidate_redirects: true,
            user_agent: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Why a plain fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Cannot access private or local addresses")]
    PrivateAddress,
    #[error("Request timed out")]
    Timeout,
    #[error("Expected an HTML page but received {0}")]
    NonHtmlContent(String),
    #[error("Response exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("Server responded with HTTP {0}")]
    HttpError(u16),
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<RejectionReason> for FetchError {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::UnsafeTarget => FetchError::PrivateAddress,
            other => FetchError::InvalidUrl(other.to_string()),
        }
    }
}

/// HTTP fetcher for vetted targets.
#[derive(Clone)]
pub struct PlainFetcher {
    client: Client,
    validator: Arc<UrlValidator>,
    config: FetchConfig,
}

impl PlainFetcher {
    pub fn new(config: FetchConfig, validator: Arc<UrlValidator>) -> Result<Self, FetchError> {
        let resolver = GuardedDnsResolver::new(validator.dns().clone());
        let client = Client::builder()
            .user_agent(resolve_user_agent(config.user_agent.as_deref()))
            .timeout(config.timeout())
            .redirect(redirect::Policy::none())
            .gzip(true)
            .brotli(true)
            .dns_resolver(Arc::new(resolver))
            .build()
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            validator,
            config,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a target and return its HTML.
    ///
    /// Non-HTML content types are rejected before the body is read. Bodies
    /// are read incrementally and abandoned once they pass the size limit.
    pub async fn fetch(&self, url: &TargetUrl) -> Result<FetchResult, FetchError> {
        let deadline = Instant::now() + self.config.timeout();
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let response = self.send(&current, deadline).await?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = response.headers().get(LOCATION) {
                    hops += 1;
                    if hops > self.config.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.config.max_redirects));
                    }
                    let location = location
                        .to_str()
                        .map_err(|_| FetchError::InvalidUrl("non-text Location header".into()))?;
                    let next = current
                        .as_url()
                        .join(location)
                        .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
                    debug!("Following redirect {} -> {}", current, next);
                    current = self.check_redirect(&current, next).await?;
                    continue;
                }
            }

            if !status.is_success() {
                return Err(FetchError::HttpError(status.as_u16()));
            }

            let headers = curate_headers(response.headers());
            match headers.get("content-type") {
                Some(content_type) if is_html_content_type(content_type) => {}
                Some(content_type) => {
                    return Err(FetchError::NonHtmlContent(content_type.clone()));
                }
                None => return Err(FetchError::NonHtmlContent("missing".into())),
            }

            let body = self.read_limited(response, deadline).await?;
            return Ok(FetchResult {
                html: String::from_utf8_lossy(&body).into_owned(),
                final_url: current,
                status_code: status.as_u16(),
                headers,
            });
        }
    }

    async fn send(&self, url: &TargetUrl, deadline: Instant) -> Result<Response, FetchError> {
        let request = self
            .client
            .get(url.as_str())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send();

        match tokio::time::timeout_at(deadline, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(map_reqwest_error(e)),
            Err(_) => Err(FetchError::Timeout),
        }
    }

    async fn check_redirect(
        &self,
        current: &TargetUrl,
        next: Url,
    ) -> Result<TargetUrl, FetchError> {
        if self.config.revalidate_redirects {
            return self.validator.vet(next).await.map_err(|reason| {
                warn!("Blocked redirect: {}", reason);
                FetchError::from(reason)
            });
        }

        if !matches!(next.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "redirect to unsupported scheme {}",
                next.scheme()
            )));
        }

        // The host being fetched was vetted already; a new host gets the
        // literal check since IP literals bypass the guarded resolver.
        let host = next.host_str().unwrap_or_default();
        let same_host = current.as_url().host_str() == Some(host);
        if !same_host && classify(host).is_private {
            warn!("Blocked redirect to private host {}", host);
            return Err(FetchError::PrivateAddress);
        }

        Ok(TargetUrl::vetted(next))
    }

    async fn read_limited(
        &self,
        mut response: Response,
        deadline: Instant,
    ) -> Result<Vec<u8>, FetchError> {
        let limit = self.config.max_response_bytes;

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0));
        loop {
            let chunk = match tokio::time::timeout_at(deadline, response.chunk()).await {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(map_reqwest_error(e)),
                Err(_) => return Err(FetchError::Timeout),
            };
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        return FetchError::Timeout;
    }

    let mut source: Option<&(dyn StdError + 'static)> = e.source();
    while let Some(err) = source {
        if err.downcast_ref::<UnsafeHost>().is_some() {
            return FetchError::PrivateAddress;
        }
        source = err.source();
    }

    // Only the host is named in the message, never the resolved address
    let host = e.url().and_then(|u| u.host_str()).map(str::to_string);
    match host {
        Some(host) if classify(&host).is_private => FetchError::PrivateAddress,
        Some(host) if e.is_connect() => {
            FetchError::NetworkError(format!("could not connect to {}", host))
        }
        _ => FetchError::NetworkError(e.without_url().to_string()),
    }
}
