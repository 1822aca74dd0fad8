//! Errors surfaced to audit callers.
//!
//! Component errors ([`RejectionReason`], [`FetchError`], [`RenderError`],
//! [`AdmissionError`]) fold into [`AuditError`], whose display text is the
//! sanitized message shown to end users. Detail that helps operators is
//! logged where the failure happens and never carried here.

use axum::http::StatusCode;

use crate::admission::AdmissionError;
use crate::browser::RenderError;
use crate::fetch::FetchError;
use crate::safety::{RejectionReason, UNSAFE_TARGET_MESSAGE};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("{0}")]
    Validation(RejectionReason),
    #[error("Cannot access private or local addresses")]
    UnsafeTarget,
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_seconds: Option<u64>,
    },
    #[error("The site took too long to respond")]
    FetchTimeout,
    #[error("The page is too large to audit")]
    FetchTooLarge,
    #[error("The URL did not return an HTML page")]
    FetchNonHtml,
    #[error("The site responded with HTTP {0}")]
    HttpStatus(u16),
    #[error("Could not reach the site")]
    Network,
    #[error("Rendering the page timed out")]
    RenderTimeout,
    #[error("Cannot access private or local addresses")]
    RenderUnsafeRedirect,
    #[error("The audit service is unavailable")]
    Unavailable,
}

pub type AuditResult<T> = Result<T, AuditError>;

impl AuditError {
    /// Message safe to show to whoever submitted the URL.
    pub fn public_message(&self) -> String {
        match self {
            Self::UnsafeTarget | Self::RenderUnsafeRedirect => UNSAFE_TARGET_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnsafeTarget | Self::RenderUnsafeRedirect => {
                StatusCode::BAD_REQUEST
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::FetchTimeout | Self::RenderTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::FetchTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::FetchNonHtml => StatusCode::UNPROCESSABLE_ENTITY,
            Self::HttpStatus(_) | Self::Network => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short machine-readable tag for logs and clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_url",
            Self::UnsafeTarget => "unsafe_target",
            Self::RateLimited { .. } => "rate_limited",
            Self::FetchTimeout => "fetch_timeout",
            Self::FetchTooLarge => "fetch_too_large",
            Self::FetchNonHtml => "fetch_non_html",
            Self::HttpStatus(_) => "http_status",
            Self::Network => "network",
            Self::RenderTimeout => "render_timeout",
            Self::RenderUnsafeRedirect => "render_unsafe_redirect",
            Self::Unavailable => "unavailable",
        }
    }
}

impl From<RejectionReason> for AuditError {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::UnsafeTarget => Self::UnsafeTarget,
            other => Self::Validation(other),
        }
    }
}

impl From<FetchError> for AuditError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::PrivateAddress => Self::UnsafeTarget,
            FetchError::InvalidUrl(_) => Self::Validation(RejectionReason::InvalidSyntax),
            FetchError::Timeout => Self::FetchTimeout,
            FetchError::TooLarge { .. } => Self::FetchTooLarge,
            FetchError::NonHtmlContent(_) => Self::FetchNonHtml,
            FetchError::HttpError(status) => Self::HttpStatus(status),
            FetchError::TooManyRedirects(_) | FetchError::NetworkError(_) => Self::Network,
        }
    }
}

impl From<RenderError> for AuditError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::UnsafeRedirect => Self::RenderUnsafeRedirect,
            RenderError::Timeout => Self::RenderTimeout,
            RenderError::Unavailable
            | RenderError::Launch(_)
            | RenderError::Browser(_)
            | RenderError::EmptyContent => Self::Unavailable,
        }
    }
}

impl From<AdmissionError> for AuditError {
    fn from(_: AdmissionError) -> Self {
        Self::Unavailable
    }
}
