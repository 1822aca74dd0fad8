//! HTTP surface for audits.
//!
//! - `POST /api/audit` runs an audit for the calling client
//! - `GET /api/rate-limit` reports the caller's remaining quota
//! - `GET /health` reports liveness and admission load

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditService;
use crate::config::Settings;
use crate::rate_limit::spawn_cleanup_task;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub audit: Arc<AuditService>,
}

impl AppState {
    pub fn new(audit: Arc<AuditService>) -> Self {
        Self { audit }
    }

    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(AuditService::from_settings(settings).await?)))
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings).await?;
    let _cleanup = spawn_cleanup_task(
        state.audit.limiter(),
        Duration::from_secs(settings.cleanup_interval_secs.max(1)),
    );
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
