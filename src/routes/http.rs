// Handlers for the inbound HTTP surface.

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::models::CanaryEvent;
use crate::version::{NAME, VERSION};

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /canary — someone probing us; nothing to do.
pub(super) async fn canary_probe_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// POST /canary — inbound webhook delivery. Malformed bodies are ignored;
/// the sender retries on non-2xx and a bad event will never get better.
pub(super) async fn canary_handler(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let Ok(event) = serde_json::from_slice::<CanaryEvent>(&body) else {
        return StatusCode::OK;
    };
    let now = chrono::Utc::now().timestamp();
    state.canary.handle_event(&event, now).await;
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub(super) struct SlashRequest {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
}

/// POST /slack — slash-command dispatch.
pub(super) async fn slack_handler(
    State(state): State<AppState>,
    Form(req): Form<SlashRequest>,
) -> Response {
    match req.command.as_str() {
        "/watcher" => state.watcher.command(&req.text).await.into_response(),
        _ => "unknown command".into_response(),
    }
}

/// GET /sheet/{filename} — download a previously rendered workbook.
pub(super) async fn sheet_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    if filename.contains('/') || filename.contains("..") {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    let contents = match std::fs::read(state.data_dir.join(&filename)) {
        Ok(contents) => contents,
        Err(e) => return (StatusCode::NOT_FOUND, format!("{e}")).into_response(),
    };
    (
        [
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        ],
        contents,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub(super) struct StatsQuery {
    pub begin: Option<i64>,
    pub duration: Option<i64>,
}

/// GET /stats/{host}?begin=&duration= — extract a window of the host's grid.
/// Omitting the window returns the whole rolling history.
pub(super) async fn stats_handler(
    State(state): State<AppState>,
    Path(host): Path<String>,
    Query(q): Query<StatsQuery>,
) -> Response {
    match state
        .grid
        .extract(&host, q.begin.unwrap_or(0), q.duration.unwrap_or(0))
    {
        Some(stats) => axum::Json(stats).into_response(),
        None => (StatusCode::NOT_FOUND, "no stats for host").into_response(),
    }
}
