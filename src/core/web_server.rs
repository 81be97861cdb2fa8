//! HTTP API.
//!
//! Thin axum layer over the job registry, launcher, track counter, admission
//! policy and batch packager. Requests are scoped by the optional
//! `x-session-id` header.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::core::config::{expand_path, Config};
use crate::core::error::{AppError, AppResult};
use crate::core::utils::{is_valid_batch_id, normalize_urls};
use crate::download::admission::{AccessCredential, AdmissionPolicy};
use crate::download::counting::{estimate_tracks, ToolTrackCounter, TrackCounter};
use crate::download::launcher::Launcher;
use crate::jobs::{BatchSummary, JobRegistry};
use crate::storage::{collect_stats, BatchPackager};

/// Header carrying the caller's opaque session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Non-secret settings reported by `GET /api/config`.
#[derive(Debug, Clone, Serialize)]
pub struct PublicSettings {
    pub audio_format: String,
    pub audio_bitrate: String,
    pub free_track_threshold: u32,
    pub credential_configured: bool,
    pub max_concurrent_downloads: Option<usize>,
}

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub launcher: Launcher,
    pub counter: Arc<dyn TrackCounter>,
    pub admission: Arc<AdmissionPolicy>,
    pub packager: Arc<BatchPackager>,
    /// Changed at runtime through `POST /api/config/download_dir`
    pub download_dir: Arc<RwLock<PathBuf>>,
    pub settings: Arc<PublicSettings>,
}

impl AppState {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let registry = Arc::new(JobRegistry::new(config.job_ttl(), config.max_jobs));
        let launcher = Launcher::new(registry, config.tool_options(), config.max_concurrent_downloads);
        let counter = ToolTrackCounter::new(config.tool_options(), config.count_timeout());
        let credential = AccessCredential::from_config(config.access_secret.as_ref(), config.access_secret_hash.as_deref())?;

        let settings = PublicSettings {
            audio_format: config.audio_format.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            free_track_threshold: config.free_track_threshold,
            credential_configured: credential.is_configured(),
            max_concurrent_downloads: config.max_concurrent_downloads,
        };

        Ok(Self {
            launcher,
            counter: Arc::new(counter),
            admission: Arc::new(AdmissionPolicy::new(config.free_track_threshold, credential)),
            packager: Arc::new(BatchPackager::new()),
            download_dir: Arc::new(RwLock::new(config.download_dir_path())),
            settings: Arc::new(settings),
        })
    }

    /// Replaces the track counter, e.g. with a fixed one in tests.
    pub fn with_counter(mut self, counter: Arc<dyn TrackCounter>) -> Self {
        self.counter = counter;
        self
    }

    async fn download_root(&self) -> PathBuf {
        self.download_dir.read().await.clone()
    }
}

#[derive(Debug, Deserialize)]
pub struct CountRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub batch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadDirRequest {
    #[serde(default)]
    pub path: String,
}

/// All API routes, plus the static UI as a fallback when `static_dir` is set.
pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/health", get(health_handler))
        .route("/api/count", post(count_handler))
        .route("/api/download", post(download_handler))
        .route("/api/status", get(status_handler))
        .route("/api/batches/{id}", get(batch_handler))
        .route("/api/batches/{id}/archive", get(archive_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/config", get(config_handler))
        .route("/api/config/download_dir", post(download_dir_handler))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };
    app.layer(CorsLayer::permissive())
}

/// Start the web server and the registry reaper.
pub async fn start_web_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    fs_err::tokio::create_dir_all(state.download_root().await).await?;

    Arc::clone(state.launcher.registry()).spawn_reaper(config.reap_interval());

    let static_dir = config.static_dir_path();
    let app = router(state, static_dir.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Starting web server on http://{}", addr);
    tracing::info!("  /health                       - Health check");
    tracing::info!("  /api/count                    - Track count estimate");
    tracing::info!("  /api/download                 - Start downloads");
    tracing::info!("  /api/status                   - Job status");
    tracing::info!("  /api/batches/{{id}}[/archive]   - Batch status / zip");
    tracing::info!("  /api/stats                    - Download folder stats");
    tracing::info!("  /api/config[/download_dir]    - Settings");
    if let Some(dir) = &static_dir {
        tracing::info!("  /                             - Static files from {}", dir.display());
    }

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, running downloads are abandoned");
}

/// Session scope from the request headers; blank values count as none.
fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn checked_batch_id(id: &str) -> AppResult<()> {
    if is_valid_batch_id(id) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid batch id: {}", id)))
    }
}

/// The caller's view of batch `id` and the download root it lives under.
///
/// A known batch resolves to the root it was created in, even after the download
/// directory changed. A batch of another session is reported as missing. Batches
/// the registry no longer knows fall back to the current root.
async fn locate_batch(state: &AppState, id: &str, session: Option<&str>) -> AppResult<(BatchSummary, PathBuf)> {
    checked_batch_id(id)?;
    let registry = state.launcher.registry();
    let summary = registry.batch_in_session(id, session);
    if summary.jobs.is_empty() && !registry.batch(id).jobs.is_empty() {
        return Err(AppError::NotFound(format!("Batch {} not found", id)));
    }

    let root = match summary.dir.as_deref().and_then(|dir| dir.parent()) {
        Some(root) => root.to_path_buf(),
        None => state.download_root().await,
    };
    Ok((summary, root))
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// POST /api/count
async fn count_handler(
    State(state): State<AppState>,
    payload: Result<Json<CountRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = payload?;
    let urls = normalize_urls(&req.urls)?;
    let estimate = estimate_tracks(state.counter.as_ref(), &urls).await;

    Ok(Json(json!({
        "total_tracks": estimate.total_tracks,
        "threshold": state.admission.free_threshold(),
        "requires_credential": state.admission.requires_credential(estimate.total_tracks),
        "urls": estimate.urls,
    }))
    .into_response())
}

/// POST /api/download
async fn download_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = payload?;
    let urls = normalize_urls(&req.urls)?;
    let credential = req.credential.as_deref();

    // a valid credential admits anything, so counting is skipped
    if !state.admission.has_valid_credential(credential) {
        let estimate = estimate_tracks(state.counter.as_ref(), &urls).await;
        state.admission.check(estimate.total_tracks, credential)?;
    }

    let session = session_of(&headers);
    let root = state.download_root().await;
    let submission = state.launcher.submit(session.as_deref(), &urls, &root).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Downloads started",
            // nothing was started when every URL was skipped
            "batch_id": (!submission.accepted.is_empty()).then_some(&submission.batch_id),
            "accepted": submission.accepted,
            "skipped": submission.skipped,
        })),
    )
        .into_response())
}

/// GET /api/status
async fn status_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = session_of(&headers);
    Json(state.launcher.registry().list(session.as_deref())).into_response()
}

/// GET /api/batches/{id}
async fn batch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    checked_batch_id(&id)?;
    let session = session_of(&headers);
    let summary = state.launcher.registry().batch_in_session(&id, session.as_deref());
    if summary.jobs.is_empty() {
        return Err(AppError::NotFound(format!("Batch {} not found", id)));
    }
    Ok(Json(summary).into_response())
}

/// GET /api/batches/{id}/archive
async fn archive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let session = session_of(&headers);
    let (summary, root) = locate_batch(&state, &id, session.as_deref()).await?;
    if !summary.settled {
        return Err(AppError::Conflict(format!("Batch {} is still downloading", id)));
    }

    let path = state.packager.archive(&root, &id).await?;
    let file = fs_err::tokio::File::open(&path).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}.zip\"", id)),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// GET /api/stats
async fn stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Query(query) = query?;
    let dir = match query.batch.as_deref().filter(|b| !b.is_empty()) {
        Some(batch) => {
            let session = session_of(&headers);
            let (_, root) = locate_batch(&state, batch, session.as_deref()).await?;
            root.join(batch)
        }
        None => state.download_root().await,
    };

    let extension = state.settings.audio_format.clone();
    let stats = tokio::task::spawn_blocking(move || collect_stats(&dir, &extension))
        .await
        .map_err(|e| anyhow::anyhow!("stats task failed: {}", e))??;
    Ok(Json(stats).into_response())
}

/// GET /api/config
async fn config_handler(State(state): State<AppState>) -> Response {
    let root = state.download_root().await;
    Json(json!({
        "download_dir": root.display().to_string(),
        "audio_format": state.settings.audio_format,
        "audio_bitrate": state.settings.audio_bitrate,
        "free_track_threshold": state.settings.free_track_threshold,
        "credential_configured": state.settings.credential_configured,
        "max_concurrent_downloads": state.settings.max_concurrent_downloads,
    }))
    .into_response()
}

/// POST /api/config/download_dir
async fn download_dir_handler(
    State(state): State<AppState>,
    payload: Result<Json<DownloadDirRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = payload?;
    let raw = req.path.trim();
    if raw.is_empty() {
        return Err(AppError::Validation("No path provided".to_string()));
    }

    let path = expand_path(raw);
    fs_err::tokio::create_dir_all(&path).await?;
    tracing::info!(path = %path.display(), "download directory changed");
    *state.download_dir.write().await = path;

    Ok(Json(json!({ "message": "Download directory updated" })).into_response())
}
