//! HTTP front-end
//!
//! The router only translates requests into engine runs and serializes the
//! result; it holds no sync logic of its own.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hostsync_core::{CancelSignal, EngineEvent, SyncEngine, SyncMode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "hostsync";

/// Shared handler state
///
/// The engine mutex doubles as the execution lock: a run holds it for its
/// whole duration and concurrent requests are turned away.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Mutex<SyncEngine>>,
    run_timeout: Duration,
}

impl AppState {
    pub fn new(engine: SyncEngine, run_timeout: Duration) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            run_timeout,
        }
    }
}

/// Optional body of the sync endpoints
#[derive(Debug, Default, Deserialize)]
struct RunRequest {
    #[serde(default)]
    limit: Option<usize>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/dry-run", post(dry_run))
        .route("/sync", post(sync))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "endpoints": ["GET /status", "POST /dry-run", "POST /sync"],
    }))
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn dry_run(State(state): State<AppState>, body: Bytes) -> Response {
    execute(state, SyncMode::DryRun, &body).await
}

async fn sync(State(state): State<AppState>, body: Bytes) -> Response {
    execute(state, SyncMode::Apply, &body).await
}

async fn execute(state: AppState, mode: SyncMode, body: &[u8]) -> Response {
    let limit = parse_limit(body);

    let Ok(engine) = state.engine.try_lock() else {
        warn!(?mode, "Rejected run request: sync already running");
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "sync already running" })),
        )
            .into_response();
    };

    let (handle, signal) = CancelSignal::pair();
    let run_timeout = state.run_timeout;
    let timer = tokio::spawn(async move {
        tokio::time::sleep(run_timeout).await;
        warn!(timeout = ?run_timeout, "Run timeout reached, cancelling remaining devices");
        handle.cancel();
    });

    let result = engine.run_with_cancel(mode, limit, signal).await;
    timer.abort();

    match result {
        Ok(result) => {
            info!(
                dry_run = result.dry_run,
                cancelled = result.cancelled,
                counts = ?result.counts,
                "Run completed"
            );
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": e.to_string(), "kind": e.kind() })),
        )
            .into_response(),
    }
}

/// Missing, empty or malformed bodies mean "no limit"
fn parse_limit(body: &[u8]) -> Option<usize> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice::<RunRequest>(body) {
        Ok(request) => request.limit,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed run request body");
            None
        }
    }
}

/// Log engine events until the engine is dropped
pub fn spawn_event_logger(mut events: mpsc::Receiver<EngineEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                EngineEvent::DeviceFailed { .. } | EngineEvent::RunFailed { .. } => {
                    warn!(?event, "Engine event");
                }
                _ => debug!(?event, "Engine event"),
            }
        }
    })
}
