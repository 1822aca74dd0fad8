//! Audit orchestration.
//!
//! One audit runs in this order:
//! 1. rate limit check for the caller
//! 2. URL validation (syntax, scheme, address safety)
//! 3. wait for an admission slot
//! 4. plain fetch, plus a headless render for deep technology detection
//! 5. release the slot
//! 6. run analyzers over the fetched page and aggregate a score
//!
//! Steps 1 and 2 fail fast without touching the network or taking a slot.

mod analyzer;
mod performance;
mod score;
mod security;
mod seo;
mod tech;

pub use analyzer::{
    Analyzer, Category, CategoryReport, Grade, Issue, OverallScore, PageSnapshot,
    ScoreAggregator, Severity,
};
pub use performance::PerformanceAnalyzer;
pub use score::WeightedAggregator;
pub use security::SecurityAnalyzer;
pub use seo::SeoAnalyzer;
pub use tech::TechAnalyzer;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::admission::AdmissionController;
use crate::browser::{RenderError, RenderedResult, RenderingFetcher};
use crate::config::Settings;
use crate::error::{AuditError, AuditResult};
use crate::fetch::{HeaderSnapshot, PlainFetcher};
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::safety::{DnsSafetyResolver, TargetUrl, UrlValidator};

/// Inbound audit request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub url: String,
    #[serde(default)]
    pub full_audit: bool,
    /// Render the page in a browser to detect client-side frameworks.
    /// Implies a full audit.
    #[serde(default)]
    pub deep_tech_detect: bool,
}

impl AuditRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn is_full(&self) -> bool {
        self.full_audit || self.deep_tech_detect
    }
}

/// What happened to the optional browser render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RenderingOutcome {
    #[serde(rename_all = "camelCase")]
    Rendered {
        final_url: String,
        captured_requests: usize,
        blocked_requests: usize,
        partial: bool,
    },
    Failed { reason: String },
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub url: String,
    pub final_url: TargetUrl,
    pub status_code: u16,
    pub score: u8,
    pub grade: Grade,
    pub full_audit: bool,
    pub categories: Vec<CategoryReport>,
    pub headers: HeaderSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendering: Option<RenderingOutcome>,
    pub audited_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Rate limit standing plus the audit result, so callers can report quota
/// on success and failure alike.
#[derive(Debug)]
pub struct AuditOutcome {
    pub rate_limit: RateLimitDecision,
    pub result: AuditResult<AuditReport>,
}

pub struct AuditService {
    validator: Arc<UrlValidator>,
    fetcher: PlainFetcher,
    renderer: RenderingFetcher,
    admission: Arc<AdmissionController>,
    limiter: Arc<RateLimiter>,
    analyzers: Vec<Box<dyn Analyzer>>,
    aggregator: Box<dyn ScoreAggregator>,
}

/// Analyzers every audit service starts with.
pub fn default_analyzers() -> Vec<Box<dyn Analyzer>> {
    vec![
        Box::new(SeoAnalyzer),
        Box::new(SecurityAnalyzer),
        Box::new(PerformanceAnalyzer),
        Box::new(TechAnalyzer),
    ]
}

impl AuditService {
    pub fn new(
        validator: Arc<UrlValidator>,
        fetcher: PlainFetcher,
        renderer: RenderingFetcher,
        admission: Arc<AdmissionController>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            validator,
            fetcher,
            renderer,
            admission,
            limiter,
            analyzers: default_analyzers(),
            aggregator: Box::new(WeightedAggregator),
        }
    }

    /// Wire every component from settings.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let dns = Arc::new(DnsSafetyResolver::new(settings.dns.clone()));
        let validator = Arc::new(UrlValidator::new(dns.clone()));
        let fetcher = PlainFetcher::new(settings.fetch.clone(), validator.clone())?;
        let renderer = RenderingFetcher::new(settings.browser.clone(), dns);
        let admission = Arc::new(AdmissionController::new(
            settings.admission.max_concurrent,
        ));
        let limiter = Arc::new(RateLimiter::from_config(settings.rate_limit.clone()).await);

        info!(
            "Audit service ready: {} concurrent audits, rate limiting {} ({})",
            admission.capacity(),
            if limiter.is_enabled() { "on" } else { "off" },
            limiter.provider().as_str()
        );

        Ok(Self::new(validator, fetcher, renderer, admission, limiter))
    }

    pub fn with_analyzers(mut self, analyzers: Vec<Box<dyn Analyzer>>) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Box<dyn ScoreAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn validator(&self) -> &Arc<UrlValidator> {
        &self.validator
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Rate limit the caller, then run the audit.
    pub async fn start_audit(&self, client_key: &str, request: &AuditRequest) -> AuditOutcome {
        let rate_limit = self.limiter.check(client_key).await;
        if !rate_limit.allowed {
            debug!("Rate limited {}", client_key);
            let message = rate_limit
                .reason
                .clone()
                .unwrap_or_else(|| "Too many requests".to_string());
            return AuditOutcome {
                result: Err(AuditError::RateLimited {
                    message,
                    retry_after_seconds: rate_limit.retry_after_seconds,
                }),
                rate_limit,
            };
        }

        AuditOutcome {
            result: self.run(request).await,
            rate_limit,
        }
    }

    /// Run an audit without rate limiting.
    pub async fn run(&self, request: &AuditRequest) -> AuditResult<AuditReport> {
        let target = self.validator.validate(&request.url).await.map_err(|reason| {
            debug!("Rejected audit URL {:?}: {}", request.url, reason);
            AuditError::from(reason)
        })?;
        self.run_target(&request.url, &target, request).await
    }

    async fn run_target(
        &self,
        requested: &str,
        target: &TargetUrl,
        request: &AuditRequest,
    ) -> AuditResult<AuditReport> {
        let started = Instant::now();

        let permit = self.admission.acquire().await?;
        info!("Auditing {} (slot {})", target, permit.ticket());

        let fetch = self.fetcher.fetch(target).await.map_err(|e| {
            warn!("Fetch of {} failed: {}", target, e);
            AuditError::from(e)
        })?;

        let (rendering, rendered) = if request.deep_tech_detect {
            let (outcome, rendered) = self.render(target).await?;
            (Some(outcome), rendered)
        } else {
            (None, None)
        };
        drop(permit);

        let full = request.is_full();
        let page = PageSnapshot { fetch, rendered };
        let categories: Vec<CategoryReport> = self
            .analyzers
            .iter()
            .filter(|a| full || !a.requires_full_audit())
            .map(|a| CategoryReport {
                weight: a.weight(),
                ..a.analyze(&page)
            })
            .collect();
        let overall = self.aggregator.aggregate(&categories);

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Audited {}: score {} ({:?}) in {}ms",
            target, overall.score, overall.grade, duration_ms
        );

        Ok(AuditReport {
            url: requested.to_string(),
            final_url: page.fetch.final_url,
            status_code: page.fetch.status_code,
            score: overall.score,
            grade: overall.grade,
            full_audit: full,
            categories,
            headers: page.fetch.headers,
            rendering,
            audited_at: Utc::now(),
            duration_ms,
        })
    }

    async fn render(
        &self,
        target: &TargetUrl,
    ) -> AuditResult<(RenderingOutcome, Option<RenderedResult>)> {
        if !RenderingFetcher::is_available() {
            return Ok((RenderingOutcome::Unavailable, None));
        }
        settle_render(target, self.renderer.render_and_capture(target).await)
    }
}

/// Fold a render result into the report. Only an unsafe redirect fails the
/// audit; anything else leaves the plain fetch to carry the report.
fn settle_render(
    target: &TargetUrl,
    result: Result<RenderedResult, RenderError>,
) -> AuditResult<(RenderingOutcome, Option<RenderedResult>)> {
    match result {
        Ok(rendered) => {
            let outcome = RenderingOutcome::Rendered {
                final_url: rendered.final_url.clone(),
                captured_requests: rendered.captured_requests.len(),
                blocked_requests: rendered.blocked_requests,
                partial: rendered.partial,
            };
            Ok((outcome, Some(rendered)))
        }
        Err(RenderError::UnsafeRedirect) => {
            warn!("Render of {} reached an unsafe address", target);
            Err(AuditError::RenderUnsafeRedirect)
        }
        Err(RenderError::Unavailable) => Ok((RenderingOutcome::Unavailable, None)),
        Err(e) => {
            warn!("Render of {} failed: {}", target, e);
            let reason = AuditError::from(e).public_message();
            Ok((RenderingOutcome::Failed { reason }, None))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::browser::BrowserEngineConfig;
    use crate::fetch::{FetchConfig, FetchResult};
    use crate::rate_limit::{RateLimitConfig, MINUTE_LIMIT_MESSAGE};
    use crate::safety::dns::tests::MockLookup;
    use crate::safety::{DnsConfig, RejectionReason};
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use url::Url;

    pub(crate) fn snapshot_at(url: &str, html: &str, headers: &[(&str, &str)]) -> PageSnapshot {
        let final_url = TargetUrl::vetted(Url::parse(url).expect("url"));
        PageSnapshot {
            fetch: FetchResult {
                html: html.to_string(),
                final_url,
                status_code: 200,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            rendered: None,
        }
    }

    pub(crate) fn snapshot(html: &str, headers: &[(&str, &str)]) -> PageSnapshot {
        snapshot_at("https://shop.example/", html, headers)
    }

    const PAGE: &str = r#"<!doctype html><html lang="en"><head>
        <title>Acme Widgets | Handmade since 1990</title>
        <meta name="description" content="Acme builds durable handmade widgets for workshops and homes across the country.">
        <meta name="viewport" content="width=device-width">
        <link rel="canonical" href="https://acme.example/">
        </head><body><h1>Widgets</h1></body></html>"#;

    async fn spawn_site() -> SocketAddr {
        let app = Router::new()
            .route(
                "/",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], PAGE).into_response() }),
            )
            .route("/gone", get(|| async { StatusCode::GONE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        addr
    }

    pub(crate) fn service(rate_limit: RateLimitConfig) -> AuditService {
        let lookup = MockLookup::with(&[
            ("acme.example", &["93.184.216.34"]),
            ("rebound.example", &["10.1.2.3"]),
        ]);
        let dns = Arc::new(DnsSafetyResolver::with_lookup(lookup, DnsConfig::default()));
        let validator = Arc::new(UrlValidator::new(dns.clone()));
        let fetcher = PlainFetcher::new(FetchConfig::default(), validator.clone()).expect("client");
        AuditService::new(
            validator,
            fetcher,
            RenderingFetcher::new(BrowserEngineConfig::default(), dns),
            Arc::new(AdmissionController::new(1)),
            Arc::new(RateLimiter::new(rate_limit)),
        )
    }

    fn local(addr: SocketAddr, path: &str) -> TargetUrl {
        TargetUrl::vetted(Url::parse(&format!("http://{}{}", addr, path)).expect("url"))
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: AuditRequest = serde_json::from_str(
            r#"{"url": "acme.example", "deepTechDetect": true}"#,
        )
        .unwrap();
        assert_eq!(req.url, "acme.example");
        assert!(!req.full_audit);
        assert!(req.deep_tech_detect);
        assert!(req.is_full());
    }

    #[tokio::test]
    async fn test_invalid_and_unsafe_urls_fail_fast() {
        let service = service(RateLimitConfig::default());

        let err = service.run(&AuditRequest::new("ftp://acme.example")).await.unwrap_err();
        assert_eq!(
            err,
            AuditError::Validation(RejectionReason::UnsupportedScheme("ftp".to_string()))
        );

        for url in ["http://127.0.0.1/", "rebound.example", "http://169.254.169.254/"] {
            let err = service.run(&AuditRequest::new(url)).await.unwrap_err();
            assert_eq!(err, AuditError::UnsafeTarget, "{}", url);
        }
        assert_eq!(service.admission().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_validation() {
        let service = service(RateLimitConfig {
            per_minute: 1,
            ..RateLimitConfig::default()
        });

        let first = service.start_audit("client", &AuditRequest::new("")).await;
        assert!(first.rate_limit.allowed);
        assert!(matches!(first.result, Err(AuditError::Validation(RejectionReason::Empty))));

        let second = service.start_audit("client", &AuditRequest::new("acme.example")).await;
        assert!(!second.rate_limit.allowed);
        match second.result {
            Err(AuditError::RateLimited {
                message,
                retry_after_seconds,
            }) => {
                assert_eq!(message, MINUTE_LIMIT_MESSAGE);
                assert!(retry_after_seconds.is_some());
            }
            other => panic!("expected rate limit, got {:?}", other),
        }

        let other_client = service.start_audit("other", &AuditRequest::new("")).await;
        assert!(other_client.rate_limit.allowed);
    }

    #[tokio::test]
    async fn test_quick_audit_runs_quick_analyzers() {
        let addr = spawn_site().await;
        let service = service(RateLimitConfig::default());
        let req = AuditRequest::new("http://site.test/");

        let report = service.run_target(&req.url, &local(addr, "/"), &req).await.unwrap();
        let categories: Vec<_> = report.categories.iter().map(|c| c.category).collect();
        assert_eq!(categories, vec![Category::Seo, Category::Security]);
        assert_eq!(report.url, "http://site.test/");
        assert_eq!(report.status_code, 200);
        assert!(report.rendering.is_none());
        assert!(!report.full_audit);

        let seo = &report.categories[0];
        assert_eq!(seo.score, 100);
        assert_eq!(seo.weight, 0.35);
        assert_eq!(service.admission().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_full_audit_runs_every_analyzer() {
        let addr = spawn_site().await;
        let service = service(RateLimitConfig::default());
        let req = AuditRequest {
            full_audit: true,
            ..AuditRequest::new("http://site.test/")
        };

        let report = service.run_target(&req.url, &local(addr, "/"), &req).await.unwrap();
        assert_eq!(report.categories.len(), 4);
        assert!(report.full_audit);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("finalUrl").is_some());
        assert!(json.get("grade").is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_releases_slot() {
        let addr = spawn_site().await;
        let service = service(RateLimitConfig::default());

        let req = AuditRequest::new("http://site.test/gone");
        let err = service
            .run_target(&req.url, &local(addr, "/gone"), &req)
            .await
            .unwrap_err();
        assert_eq!(err, AuditError::HttpStatus(410));
        assert_eq!(service.admission().in_flight(), 0);
    }

    #[test]
    fn test_settle_render() {
        let target = TargetUrl::vetted(Url::parse("https://acme.example/").unwrap());

        let err = settle_render(&target, Err(RenderError::UnsafeRedirect)).unwrap_err();
        assert_eq!(err, AuditError::RenderUnsafeRedirect);

        let (outcome, rendered) = settle_render(&target, Err(RenderError::Timeout)).unwrap();
        assert_eq!(
            outcome,
            RenderingOutcome::Failed {
                reason: "Rendering the page timed out".to_string()
            }
        );
        assert!(rendered.is_none());

        let (outcome, _) = settle_render(&target, Err(RenderError::Unavailable)).unwrap();
        assert_eq!(outcome, RenderingOutcome::Unavailable);

        let (outcome, rendered) = settle_render(
            &target,
            Ok(RenderedResult {
                final_url: "https://acme.example/home".to_string(),
                captured_requests: vec!["https://cdn.example/a.js".to_string()],
                partial: true,
                ..RenderedResult::default()
            }),
        )
        .unwrap();
        assert_eq!(
            outcome,
            RenderingOutcome::Rendered {
                final_url: "https://acme.example/home".to_string(),
                captured_requests: 1,
                blocked_requests: 0,
                partial: true,
            }
        );
        assert!(rendered.is_some());
    }
}
