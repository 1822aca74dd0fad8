//! Per-request decisions for intercepted browser traffic.
//!
//! Every request the page makes (scripts, iframes, XHR, redirects of the
//! main document) passes through [`RequestGuard::decide`] before it leaves
//! the browser.

use std::sync::Arc;

use url::Url;

use crate::safety::{classify, DnsSafetyResolver};

/// Coarse resource classes from the CDP `ResourceType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Script,
    Image,
    Media,
    Font,
    Xhr,
    Fetch,
    WebSocket,
    Other,
}

impl ResourceKind {
    /// Heavy resources that never affect markup or detection signals.
    pub fn is_skipped(self) -> bool {
        matches!(self, Self::Image | Self::Media | Self::Font)
    }
}

#[cfg(feature = "browser")]
impl From<&chromiumoxide::cdp::browser_protocol::network::ResourceType> for ResourceKind {
    fn from(kind: &chromiumoxide::cdp::browser_protocol::network::ResourceType) -> Self {
        use chromiumoxide::cdp::browser_protocol::network::ResourceType;
        match kind {
            ResourceType::Document => Self::Document,
            ResourceType::Stylesheet => Self::Stylesheet,
            ResourceType::Script => Self::Script,
            ResourceType::Image => Self::Image,
            ResourceType::Media => Self::Media,
            ResourceType::Font => Self::Font,
            ResourceType::Xhr => Self::Xhr,
            ResourceType::Fetch => Self::Fetch,
            ResourceType::WebSocket => Self::WebSocket,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    ResourceType,
    PrivateAddress,
    FileScheme,
    UnsupportedScheme,
    UnsafeHost,
    Malformed,
}

impl BlockReason {
    /// True when the request was refused because of where it was going.
    pub fn is_safety(self) -> bool {
        !matches!(self, Self::ResourceType)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    Continue,
    Block(BlockReason),
}

/// Verdict on the URL a page finished on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalUrlCheck {
    Safe,
    Unsafe,
    /// The browser never committed a web page (error page, about:blank).
    NotLoaded,
}

#[derive(Clone)]
pub struct RequestGuard {
    dns: Arc<DnsSafetyResolver>,
}

impl RequestGuard {
    pub fn new(dns: Arc<DnsSafetyResolver>) -> Self {
        Self { dns }
    }

    /// Decide whether an intercepted request may proceed.
    pub async fn decide(&self, url: &str, kind: ResourceKind) -> InterceptDecision {
        if kind.is_skipped() {
            return InterceptDecision::Block(BlockReason::ResourceType);
        }

        let Ok(parsed) = Url::parse(url) else {
            return InterceptDecision::Block(BlockReason::Malformed);
        };

        if let Some(host) = parsed.host_str() {
            if classify(host).is_private {
                return InterceptDecision::Block(BlockReason::PrivateAddress);
            }
        }

        match parsed.scheme() {
            "file" => return InterceptDecision::Block(BlockReason::FileScheme),
            "data" | "blob" | "about" => return InterceptDecision::Continue,
            "http" | "https" | "ws" | "wss" => {}
            _ => return InterceptDecision::Block(BlockReason::UnsupportedScheme),
        }

        let Some(host) = parsed.host_str() else {
            return InterceptDecision::Block(BlockReason::Malformed);
        };
        if self.dns.is_hostname_safe(host).await {
            InterceptDecision::Continue
        } else {
            InterceptDecision::Block(BlockReason::UnsafeHost)
        }
    }

    /// Check the URL the page settled on after navigation and redirects.
    pub async fn check_final_url(&self, url: &str) -> FinalUrlCheck {
        let Ok(parsed) = Url::parse(url) else {
            return FinalUrlCheck::NotLoaded;
        };
        match parsed.scheme() {
            "http" | "https" => {}
            "file" => return FinalUrlCheck::Unsafe,
            _ => return FinalUrlCheck::NotLoaded,
        }
        match parsed.host_str() {
            Some(host) if !classify(host).is_private && self.dns.is_hostname_safe(host).await => {
                FinalUrlCheck::Safe
            }
            _ => FinalUrlCheck::Unsafe,
        }
    }
}

/// Bounded record of request URLs seen during a render.
#[derive(Debug, Default)]
pub struct CaptureLog {
    urls: Vec<String>,
    cap: usize,
    overflow: usize,
    blocked: usize,
    main_document_blocked: bool,
}

impl CaptureLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    pub fn record(&mut self, url: &str) {
        if self.urls.len() < self.cap {
            self.urls.push(url.to_string());
        } else {
            self.overflow += 1;
        }
    }

    pub fn note_blocked(&mut self, reason: BlockReason, main_document: bool) {
        if reason.is_safety() {
            self.blocked += 1;
            if main_document {
                self.main_document_blocked = true;
            }
        }
    }

    pub fn main_document_blocked(&self) -> bool {
        self.main_document_blocked
    }

    pub fn captured(&self) -> usize {
        self.urls.len()
    }

    /// Requests refused for safety reasons.
    pub fn blocked_count(&self) -> usize {
        self.blocked
    }

    /// Requests seen past the cap and not recorded.
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::dns::tests::MockLookup;
    use crate::safety::DnsConfig;

    fn guard() -> RequestGuard {
        let lookup = MockLookup::with(&[
            ("cdn.example", &["93.184.216.34"]),
            ("rebound.example", &["127.0.0.1"]),
        ]);
        RequestGuard::new(Arc::new(DnsSafetyResolver::with_lookup(
            lookup,
            DnsConfig::default(),
        )))
    }

    #[tokio::test]
    async fn test_heavy_resources_skipped() {
        let guard = guard();
        for kind in [ResourceKind::Image, ResourceKind::Media, ResourceKind::Font] {
            assert_eq!(
                guard.decide("https://cdn.example/a.png", kind).await,
                InterceptDecision::Block(BlockReason::ResourceType)
            );
        }
    }

    #[tokio::test]
    async fn test_private_hosts_blocked() {
        let guard = guard();
        let cases = [
            ("http://169.254.169.254/latest/meta-data", BlockReason::PrivateAddress),
            ("http://localhost:8080/admin", BlockReason::PrivateAddress),
            ("https://[::1]/", BlockReason::PrivateAddress),
            ("https://rebound.example/x.js", BlockReason::UnsafeHost),
            ("https://nxdomain.example/x.js", BlockReason::UnsafeHost),
        ];
        for (url, reason) in cases {
            assert_eq!(
                guard.decide(url, ResourceKind::Script).await,
                InterceptDecision::Block(reason),
                "{}",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_scheme_rules() {
        let guard = guard();
        assert_eq!(
            guard.decide("file:///etc/passwd", ResourceKind::Document).await,
            InterceptDecision::Block(BlockReason::FileScheme)
        );
        assert_eq!(
            guard.decide("data:text/javascript,1", ResourceKind::Script).await,
            InterceptDecision::Continue
        );
        assert_eq!(
            guard.decide("about:blank", ResourceKind::Document).await,
            InterceptDecision::Continue
        );
        assert_eq!(
            guard.decide("chrome-extension://abc/x.js", ResourceKind::Script).await,
            InterceptDecision::Block(BlockReason::UnsupportedScheme)
        );
        assert_eq!(
            guard.decide("not a url", ResourceKind::Other).await,
            InterceptDecision::Block(BlockReason::Malformed)
        );
    }

    #[tokio::test]
    async fn test_public_request_continues() {
        let guard = guard();
        assert_eq!(
            guard.decide("https://cdn.example/app.js", ResourceKind::Script).await,
            InterceptDecision::Continue
        );
        assert_eq!(
            guard.decide("wss://cdn.example/socket", ResourceKind::WebSocket).await,
            InterceptDecision::Continue
        );
    }

    #[tokio::test]
    async fn test_final_url_check() {
        let guard = guard();
        assert_eq!(guard.check_final_url("https://cdn.example/").await, FinalUrlCheck::Safe);
        assert_eq!(
            guard.check_final_url("http://10.0.0.1/").await,
            FinalUrlCheck::Unsafe
        );
        assert_eq!(
            guard.check_final_url("https://rebound.example/").await,
            FinalUrlCheck::Unsafe
        );
        assert_eq!(
            guard.check_final_url("chrome-error://chromewebdata/").await,
            FinalUrlCheck::NotLoaded
        );
        assert_eq!(guard.check_final_url("about:blank").await, FinalUrlCheck::NotLoaded);
    }

    #[test]
    fn test_capture_log_is_bounded() {
        let mut log = CaptureLog::new(3);
        for i in 0..5 {
            log.record(&format!("https://cdn.example/{}", i));
        }
        assert_eq!(log.overflow(), 2);
        let urls = log.into_urls();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], "https://cdn.example/0");
    }

    #[test]
    fn test_capture_log_tracks_main_document_blocks() {
        let mut log = CaptureLog::new(10);
        log.note_blocked(BlockReason::ResourceType, true);
        assert!(!log.main_document_blocked());
        log.note_blocked(BlockReason::PrivateAddress, false);
        assert!(!log.main_document_blocked());
        assert_eq!(log.blocked_count(), 1);
        log.note_blocked(BlockReason::UnsafeHost, true);
        assert!(log.main_document_blocked());
    }
}
