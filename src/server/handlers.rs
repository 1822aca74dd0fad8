//! HTTP request handlers.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::audit::AuditRequest;
use crate::browser::RenderingFetcher;
use crate::error::AuditError;
use crate::rate_limit::{client_key, RateLimitDecision, RateLimitProvider};

/// Rejection body. Quota fields are only present for rate limit denials.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_at: Option<DateTime<Utc>>,
}

impl ErrorBody {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            limit: None,
            remaining: None,
            reset_at: None,
        }
    }
}

fn caller_key(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> String {
    client_key(headers, peer.map(|ConnectInfo(addr)| addr.ip()))
}

/// `X-RateLimit-*` and `Retry-After` headers for a decision. Nothing is
/// sent while limiting is disabled.
fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if decision.provider == RateLimitProvider::Disabled {
        return headers;
    }

    let mut put = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };
    put("x-ratelimit-limit", decision.limit.to_string());
    put("x-ratelimit-remaining", decision.remaining.to_string());
    put("x-ratelimit-reset", decision.reset_at.timestamp().to_string());
    if let Some(retry_after) = decision.retry_after_seconds {
        put("retry-after", retry_after.to_string());
    }
    headers
}

fn error_response(err: &AuditError, decision: &RateLimitDecision) -> Response {
    let mut body = ErrorBody::message(err.public_message());
    if matches!(err, AuditError::RateLimited { .. }) {
        body.limit = Some(decision.limit);
        body.remaining = Some(decision.remaining);
        body.reset_at = Some(decision.reset_at);
    }
    (err.status(), rate_limit_headers(decision), Json(body)).into_response()
}

/// Run an audit for the calling client.
pub async fn start_audit(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<AuditRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!("Rejected audit body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::message("Invalid request body")),
            )
                .into_response();
        }
    };

    let key = caller_key(&headers, peer);
    let outcome = state.audit.start_audit(&key, &request).await;

    match outcome.result {
        Ok(report) => (rate_limit_headers(&outcome.rate_limit), Json(report)).into_response(),
        Err(e) => error_response(&e, &outcome.rate_limit),
    }
}

/// Remaining quota for the calling client, without consuming any.
pub async fn rate_limit_status(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let key = caller_key(&headers, peer);
    let decision = state.audit.limiter().status(&key).await;
    (rate_limit_headers(&decision), Json(decision)).into_response()
}

/// Health check endpoint for container orchestration.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let admission = state.audit.admission();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "audits": {
            "inFlight": admission.in_flight(),
            "queued": admission.queued(),
            "capacity": admission.capacity(),
        },
        "browser": RenderingFetcher::is_available(),
        "rateLimit": state.audit.limiter().provider().as_str(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::audit::tests::service;
    use crate::rate_limit::{RateLimitConfig, MINUTE_LIMIT_MESSAGE};
    use crate::safety::UNSAFE_TARGET_MESSAGE;
    use crate::server::{create_router, AppState};

    use super::*;

    fn router(rate_limit: RateLimitConfig) -> axum::Router {
        create_router(AppState::new(Arc::new(service(rate_limit))))
    }

    fn audit_request(body: &str) -> Request<Body> {
        Request::post("/api/audit")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-real-ip", "203.0.113.9")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(RateLimitConfig::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["audits"]["capacity"], 1);
        assert_eq!(body["rateLimit"], "memory");
    }

    #[tokio::test]
    async fn test_unsafe_target_rejected_with_generic_message() {
        let response = router(RateLimitConfig::default())
            .oneshot(audit_request(r#"{"url": "http://169.254.169.254/latest/meta-data"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["x-ratelimit-limit"], "50");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "49");
        assert!(response.headers().get("retry-after").is_none());

        let body = json(response).await;
        assert_eq!(body["error"], UNSAFE_TARGET_MESSAGE);
        assert!(body.get("limit").is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let app = router(RateLimitConfig {
            per_minute: 1,
            ..RateLimitConfig::default()
        });

        let first = app
            .clone()
            .oneshot(audit_request(r#"{"url": "ftp://acme.example"}"#))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::BAD_REQUEST);

        let second = app
            .oneshot(audit_request(r#"{"url": "acme.example"}"#))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get("retry-after").is_some());
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let body = json(second).await;
        assert_eq!(body["error"], MINUTE_LIMIT_MESSAGE);
        assert_eq!(body["limit"], 1);
        assert_eq!(body["remaining"], 0);
        assert!(body["resetAt"].is_string());
    }

    #[tokio::test]
    async fn test_status_does_not_consume_quota() {
        let app = router(RateLimitConfig::default());
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/api/rate-limit")
                        .header("x-real-ip", "203.0.113.9")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json(response).await;
            assert_eq!(body["allowed"], true);
            assert_eq!(body["remaining"], 50);
        }
    }

    #[tokio::test]
    async fn test_disabled_limiter_sends_no_headers() {
        let response = router(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
        .oneshot(audit_request(r#"{"url": ""}"#))
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
        assert_eq!(json(response).await["error"], "Please enter a URL");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let response = router(RateLimitConfig::default())
            .oneshot(audit_request("{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "Invalid request body");
    }
}
