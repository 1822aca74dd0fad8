//! User-supplied URL validation.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::debug;
use url::Url;

use super::address::classify;
use super::dns::DnsSafetyResolver;

/// Public message for any target rejected as private or local.
pub const UNSAFE_TARGET_MESSAGE: &str = "Cannot access private or local addresses";

/// Why a URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    #[error("Please enter a URL")]
    Empty,
    #[error("Invalid URL format")]
    InvalidSyntax,
    #[error("Only HTTP and HTTPS URLs are supported")]
    UnsupportedScheme(String),
    #[error("URL must include a hostname")]
    MissingHost,
    #[error("URLs with embedded credentials are not supported")]
    Credentials,
    #[error("Cannot access private or local addresses")]
    UnsafeTarget,
}

/// An absolute http(s) URL that passed validation.
///
/// Only [`UrlValidator`] hands these out, so holding one means the host was
/// checked at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetUrl(Url);

impl TargetUrl {
    /// Wrap a URL without checks. Callers must have validated it already.
    pub(crate) fn vetted(url: Url) -> Self {
        Self(url)
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.0.port_or_known_default().unwrap_or(443)
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.0.query()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Serialize for TargetUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

/// Parse raw input into an absolute http(s) URL.
///
/// Input without a scheme separator gets `https://` prepended. Performs no
/// address checks.
pub fn normalize(raw: &str) -> Result<Url, RejectionReason> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RejectionReason::Empty);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|_| RejectionReason::InvalidSyntax)?;
    check_shape(&url)?;
    Ok(url)
}

fn check_shape(url: &Url) -> Result<(), RejectionReason> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(RejectionReason::UnsupportedScheme(other.to_string())),
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(RejectionReason::MissingHost),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(RejectionReason::Credentials);
    }
    Ok(())
}

/// Turns user input into a [`TargetUrl`] or a [`RejectionReason`].
#[derive(Clone)]
pub struct UrlValidator {
    dns: Arc<DnsSafetyResolver>,
}

impl UrlValidator {
    pub fn new(dns: Arc<DnsSafetyResolver>) -> Self {
        Self { dns }
    }

    pub fn dns(&self) -> &Arc<DnsSafetyResolver> {
        &self.dns
    }

    /// Normalize, then check the host literally and through DNS.
    pub async fn validate(&self, raw: &str) -> Result<TargetUrl, RejectionReason> {
        let url = normalize(raw)?;
        self.vet(url).await
    }

    /// Check an already parsed URL, such as a redirect target.
    pub async fn vet(&self, url: Url) -> Result<TargetUrl, RejectionReason> {
        check_shape(&url)?;
        let host = url.host_str().unwrap_or_default();

        let verdict = classify(host);
        if verdict.is_private {
            debug!("Rejected {}: {:?}", url, verdict.reason);
            return Err(RejectionReason::UnsafeTarget);
        }
        if !self.dns.is_hostname_safe(host).await {
            debug!("Rejected {}: resolves to a private address", url);
            return Err(RejectionReason::UnsafeTarget);
        }

        Ok(TargetUrl(url))
    }
}
