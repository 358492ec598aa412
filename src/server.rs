use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    error::ScanError,
    export,
    session::{ScanController, ScanEvent, SessionState},
    table::{Column, ResultTable},
    types::{DeviceRecord, ScanSummary},
};

#[derive(Clone)]
pub struct AppState {
    controller: Arc<ScanController>,
    inner: Arc<RwLock<ServerState>>, // result table fed by the session's events
}

#[derive(Debug, Default)]
struct ServerState {
    table: ResultTable,
    cancel: Option<CancellationToken>,
    /// Bumped on every start so a finished session's late events are dropped.
    generation: u64,
}

impl AppState {
    pub fn new(controller: Arc<ScanController>) -> Self {
        Self {
            controller,
            inner: Arc::new(RwLock::new(ServerState::default())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: SessionState,
    /// True until the table has applied the session's final event.
    pub active: bool,
    pub range: Option<String>,
    pub discovered: usize,
    pub resolved: usize,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub range: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub sort: Option<Column>,
    #[serde(default)]
    pub desc: bool,
}

#[derive(Debug, Serialize)]
pub struct ResultRow {
    /// Position in discovery order, stable across sorting.
    pub index: usize,
    pub ip: String,
    pub mac: String,
    pub os: String,
}

#[derive(Debug, Serialize)]
pub struct ResultsBody {
    pub rows: Vec<ResultRow>,
    pub summary: Option<ScanSummary>,
    pub error: Option<ScanError>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ScanError,
    message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/cancel", post(post_cancel))
        .route("/results", get(get_results))
        .route("/export.csv", get(get_export_csv))
        .with_state(state)
}

pub async fn spawn_server(bind: &str, state: AppState, ui_dir: PathBuf) -> Result<()> {
    let static_svc = ServeDir::new(ui_dir).append_index_html_on_directories(true);

    let app = Router::new()
        .nest("/api", router(state))
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http());

    info!("Serving UI on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

impl ServerState {
    /// Records in display order: discovery order, or sorted by `q.sort`.
    fn rows(&self, q: &ResultsQuery) -> Vec<(usize, &DeviceRecord)> {
        match q.sort {
            Some(column) => self.table.sorted(column, q.desc),
            None => self.table.records().iter().enumerate().collect(),
        }
    }
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let state = app.controller.state();
    let out = Status {
        state,
        active: state.is_active() || s.table.is_running(),
        range: s.table.range().map(str::to_string),
        discovered: s.table.records().len(),
        resolved: s.table.resolved_count(),
        message: s.table.status_text().to_string(),
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(
    State(app): State<AppState>,
    Query(q): Query<ResultsQuery>,
) -> impl IntoResponse {
    let s = app.inner.read().await;
    if s.table.range().is_none() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let body = ResultsBody {
        rows: s
            .rows(&q)
            .into_iter()
            .map(|(index, r)| ResultRow {
                index,
                ip: r.device.address.clone(),
                mac: r.device.hardware_address.clone(),
                os: r.fingerprint.clone(),
            })
            .collect(),
        summary: s.table.summary().cloned(),
        error: s.table.error().cloned(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn get_export_csv(
    State(app): State<AppState>,
    Query(q): Query<ResultsQuery>,
) -> impl IntoResponse {
    let s = app.inner.read().await;
    if s.table.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let records: Vec<DeviceRecord> = s.rows(&q).into_iter().map(|(_, r)| r.clone()).collect();
    match export::to_csv_string(&records) {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"scan-results.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => {
            error!("CSV export failed: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    // Hold the lock across start so the table reset cannot interleave with another request.
    let mut s = app.inner.write().await;
    let handle = match app.controller.start(&req.range) {
        Ok(handle) => handle,
        Err(e) => {
            let code = match e {
                ScanError::ScanInProgress => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            let body = ErrorBody {
                message: e.to_string(),
                error: e,
            };
            return (code, Json(body)).into_response();
        }
    };

    s.generation += 1;
    let generation = s.generation;
    s.table.begin(req.range.trim());
    let (mut events, cancel, task) = handle.into_parts();
    s.cancel = Some(cancel);
    let status = Status {
        state: app.controller.state(),
        active: true,
        range: s.table.range().map(str::to_string),
        discovered: 0,
        resolved: 0,
        message: s.table.status_text().to_string(),
    };
    drop(s);

    // Forward session events into the table
    let inner = app.inner.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut s = inner.write().await;
            if s.generation == generation {
                s.table.apply(&event);
            }
        }
        if let Err(e) = task.await {
            error!("scan session task failed: {e}");
        }
        let mut s = inner.write().await;
        if s.generation == generation {
            s.cancel = None;
            if s.table.is_running() {
                let error = ScanError::ProbeFailed("scan session ended unexpectedly".into());
                s.table.apply(&ScanEvent::Failed { error });
            }
        }
    });

    (StatusCode::ACCEPTED, Json(status)).into_response()
}

async fn post_cancel(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.cancel.as_ref() {
        Some(cancel) if app.controller.state().is_active() => {
            cancel.cancel();
            StatusCode::ACCEPTED
        }
        _ => StatusCode::CONFLICT,
    }
}
