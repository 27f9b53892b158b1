//! HTTP API.
//!
//! Read-only view over the pipeline's outputs:
//!
//! - `GET /` - HTML index of endpoints
//! - `GET /objects` - ring buffer snapshot as JSON, oldest first
//! - `GET /latest.jpg` - the current raw capture
//! - `GET /image/{name}` - an archived source or prediction image
//! - `GET /health` - liveness probe
//! - `GET /metrics` - Prometheus text exposition
//!
//! Handlers never touch the detector; they read the ring buffer and the
//! file system only. Failures surface as client-visible status codes
//! with a matching `api_errors` increment.

use crate::detector::DetectionResult;
use crate::metrics::Metrics;
use crate::ring::DetectionRing;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const HANDLER_OBJECTS: &str = "/objects";
const HANDLER_LATEST: &str = "/latest.jpg";
const HANDLER_IMAGE: &str = "/image/";
const HANDLER_METRICS: &str = "/metrics";

const INDEX_HTML: &str = "<html><body>\n\
<h1>darknetd API</h1>\n\
<ul>\n\
<li> <a href=\"objects\">/objects</a>: returns JSON list of most recent predictions\n\
<li> <a href=\"latest.jpg\">/latest.jpg</a>: returns latest source image\n\
<li> /image/{imagename}.jpg: returns source or prediction image (get {imagename} from /objects output)\n\
<li> <a href=\"metrics\">/metrics</a>: returns performance metrics in prometheus format\n\
<li> <a href=\"health\">/health</a>: returns 'OK' if healthy\n\
</ul>\n\
</body></html>";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Ring buffer of recent results.
    pub ring: Arc<DetectionRing>,
    /// Metrics handle, also the `/metrics` source.
    pub metrics: Metrics,
    /// Path of the current raw capture.
    pub capture_path: PathBuf,
    /// Archive directory the image handler serves from.
    pub archive_dir: PathBuf,
}

/// Builds the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/objects", get(objects))
        .route("/latest.jpg", get(latest_image))
        .route("/image/:name", get(archived_image))
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

/// Serves the API on an already-bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> &'static str {
    "OK"
}

async fn objects(State(state): State<ApiState>) -> Json<Vec<DetectionResult>> {
    state.metrics.api_request(HANDLER_OBJECTS);
    Json(state.ring.snapshot())
}

async fn latest_image(State(state): State<ApiState>) -> Response {
    match tokio::fs::read(&state.capture_path).await {
        Ok(bytes) => {
            state.metrics.api_request(HANDLER_LATEST);
            jpeg_response(bytes)
        }
        Err(err) => {
            warn!(
                path = %state.capture_path.display(),
                error = %err,
                "latest capture not readable"
            );
            state.metrics.api_error(HANDLER_LATEST, "open");
            (StatusCode::NOT_FOUND, "latest image not available").into_response()
        }
    }
}

async fn archived_image(
    State(state): State<ApiState>,
    UrlPath(name): UrlPath<String>,
) -> Response {
    if !image_name_is_safe(&name) {
        debug!(name = %name, "rejected image request");
        state.metrics.api_error(HANDLER_IMAGE, "invalid_name");
        return (StatusCode::NOT_FOUND, "invalid image name").into_response();
    }

    let path = state.archive_dir.join(&name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            state.metrics.api_request(HANDLER_IMAGE);
            jpeg_response(bytes)
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "archived image not readable");
            state.metrics.api_error(HANDLER_IMAGE, "open");
            (StatusCode::NOT_FOUND, "image not found").into_response()
        }
    }
}

async fn metrics_text(State(state): State<ApiState>) -> Response {
    state.metrics.api_request(HANDLER_METRICS);
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "metrics encoding failed");
            state.metrics.api_error(HANDLER_METRICS, "encode");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

fn jpeg_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()
}

/// Accepts only bare jpg file names; anything that could traverse out
/// of the archive directory is rejected.
fn image_name_is_safe(name: &str) -> bool {
    name.ends_with("jpg")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}
