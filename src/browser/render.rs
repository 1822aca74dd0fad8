//! Headless render with request interception.

use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{FrameId, NavigateParams};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::fetch::{curate_json_headers, resolve_user_agent, HeaderSnapshot};
use crate::safety::TargetUrl;

use super::config::BrowserEngineConfig;
use super::guard::{CaptureLog, FinalUrlCheck, InterceptDecision, RequestGuard, ResourceKind};
use super::session::BrowserSession;
use super::signals::{JsSignals, JS_SIGNALS_SCRIPT};
use super::types::{assess_content, RenderError, RenderedResult};

/// Intercepted requests decided at once.
const MAX_CONCURRENT_DECISIONS: usize = 16;

/// JavaScript to wait for page ready state.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
"#;

fn browser_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Browser(e.to_string())
}

/// Aborts background listeners on every exit path.
struct TaskGuard(Vec<JoinHandle<()>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

pub(super) async fn render(
    session: &BrowserSession,
    config: &BrowserEngineConfig,
    guard: &RequestGuard,
    url: &TargetUrl,
) -> Result<RenderedResult, RenderError> {
    let page = session
        .browser
        .new_page("about:blank")
        .await
        .map_err(browser_error)?;

    let user_agent = resolve_user_agent(config.user_agent.as_deref());
    page.execute(SetUserAgentOverrideParams::new(user_agent))
        .await
        .map_err(browser_error)?;

    let main_frame = page.mainframe().await.ok().flatten();
    let log = Arc::new(Mutex::new(CaptureLog::new(config.max_captured_requests)));
    let main_headers = Arc::new(Mutex::new(HeaderSnapshot::new()));

    let paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(browser_error)?;
    let responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(browser_error)?;

    let tasks = TaskGuard(vec![
        tokio::spawn(intercept_requests(
            page.clone(),
            paused,
            guard.clone(),
            log.clone(),
            main_frame.clone(),
        )),
        tokio::spawn(watch_main_response(
            responses,
            main_headers.clone(),
            main_frame,
        )),
    ]);

    let deadline = Instant::now() + config.navigation_timeout();
    let timed_out =
        !navigate(&page, url, deadline).await? || !wait_for_page_ready(&page, deadline).await;
    if !timed_out {
        tokio::time::sleep(config.settle()).await;
    }

    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());

    if log.lock().await.main_document_blocked() {
        warn!("Render of {} was redirected to a blocked address", url);
        return Err(RenderError::UnsafeRedirect);
    }
    match guard.check_final_url(&final_url).await {
        FinalUrlCheck::Safe => {}
        FinalUrlCheck::Unsafe => {
            warn!("Render of {} ended on unsafe URL {}", url, final_url);
            return Err(RenderError::UnsafeRedirect);
        }
        FinalUrlCheck::NotLoaded if timed_out => return Err(RenderError::Timeout),
        FinalUrlCheck::NotLoaded => {
            return Err(RenderError::Browser(format!(
                "navigation to {} did not load a page",
                url
            )))
        }
    }

    let html = page.content().await.map_err(browser_error)?;
    assess_content(&html, timed_out)?;

    let cookie_names = match page.get_cookies().await {
        Ok(cookies) => cookies.into_iter().map(|c| c.name).collect(),
        Err(e) => {
            debug!("Could not read cookies: {}", e);
            Vec::new()
        }
    };

    let js_signals = match page.evaluate(JS_SIGNALS_SCRIPT.to_string()).await {
        Ok(result) => JsSignals::from_value(result.into_value().unwrap_or_default()),
        Err(e) => {
            debug!("Signal script failed: {}", e);
            JsSignals::default()
        }
    };

    drop(tasks);
    let log = std::mem::take(&mut *log.lock().await);
    let main_response_headers = std::mem::take(&mut *main_headers.lock().await);

    debug!(
        "Rendered {}: {} requests captured, {} blocked, {} over cap",
        url,
        log.captured(),
        log.blocked_count(),
        log.overflow()
    );

    Ok(RenderedResult {
        html,
        final_url,
        blocked_requests: log.blocked_count(),
        captured_requests: log.into_urls(),
        js_signals,
        cookie_names,
        main_response_headers,
        partial: timed_out,
    })
}

/// Returns false if navigation ran past the deadline.
async fn navigate(page: &Page, url: &TargetUrl, deadline: Instant) -> Result<bool, RenderError> {
    let params = NavigateParams::builder()
        .url(url.as_str())
        .build()
        .map_err(browser_error)?;

    match tokio::time::timeout_at(deadline, page.execute(params)).await {
        Ok(Ok(_)) => Ok(true),
        Ok(Err(e)) => {
            // Blocked navigations surface here; the final URL check decides
            debug!("Navigation to {} reported: {}", url, e);
            Ok(true)
        }
        Err(_) => {
            warn!("Navigation to {} timed out", url);
            Ok(false)
        }
    }
}

/// Wait for DOMContentLoaded. Returns false if the deadline passed first.
async fn wait_for_page_ready(page: &Page, deadline: Instant) -> bool {
    match tokio::time::timeout_at(deadline, page.evaluate(WAIT_FOR_READY_SCRIPT.to_string())).await
    {
        Ok(Ok(result)) => {
            let state: String = result
                .into_value()
                .unwrap_or_else(|_| "unknown".to_string());
            debug!("Page ready state: {}", state);
            true
        }
        Ok(Err(e)) => {
            debug!("Could not check ready state (possibly non-HTML page): {}", e);
            true
        }
        Err(_) => {
            warn!("Timeout waiting for page ready state");
            false
        }
    }
}

async fn intercept_requests(
    page: Page,
    events: EventStream<EventRequestPaused>,
    guard: RequestGuard,
    log: Arc<Mutex<CaptureLog>>,
    main_frame: Option<FrameId>,
) {
    events
        .for_each_concurrent(MAX_CONCURRENT_DECISIONS, |event| {
            let page = &page;
            let guard = &guard;
            let log = &log;
            let main_frame = &main_frame;
            async move {
                let kind = ResourceKind::from(&event.resource_type);
                let url = event.request.url.as_str();
                log.lock().await.record(url);

                match guard.decide(url, kind).await {
                    InterceptDecision::Continue => {
                        let params = ContinueRequestParams::new(event.request_id.clone());
                        if let Err(e) = page.execute(params).await {
                            debug!("Failed to continue request {}: {}", url, e);
                        }
                    }
                    InterceptDecision::Block(reason) => {
                        let main_document = kind == ResourceKind::Document
                            && main_frame.as_ref().map_or(true, |f| *f == event.frame_id);
                        log.lock().await.note_blocked(reason, main_document);
                        if reason.is_safety() {
                            warn!("Blocked browser request to {} ({:?})", url, reason);
                        }

                        let params = FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        );
                        if let Err(e) = page.execute(params).await {
                            debug!("Failed to abort request {}: {}", url, e);
                        }
                    }
                }
            }
        })
        .await;
}

async fn watch_main_response(
    mut events: EventStream<EventResponseReceived>,
    headers: Arc<Mutex<HeaderSnapshot>>,
    main_frame: Option<FrameId>,
) {
    while let Some(event) = events.next().await {
        if event.r#type != ResourceType::Document {
            continue;
        }
        if let (Some(main), Some(frame)) = (&main_frame, &event.frame_id) {
            if main != frame {
                continue;
            }
        }
        if let Ok(value) = serde_json::to_value(&event.response.headers) {
            *headers.lock().await = curate_json_headers(&value);
        }
    }
}
