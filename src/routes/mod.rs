// HTTP surface: canary webhook, slash-command endpoint, sheet downloads,
// and the grid extract query.

mod http;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::canary::Canary;
use crate::grid::StatsGrid;
use crate::watcher::Watcher;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) grid: Arc<StatsGrid>,
    pub(crate) canary: Arc<Canary>,
    pub(crate) watcher: Arc<Watcher>,
    pub(crate) data_dir: PathBuf,
}

pub fn app(
    grid: Arc<StatsGrid>,
    canary: Arc<Canary>,
    watcher: Arc<Watcher>,
    data_dir: PathBuf,
) -> Router {
    let state = AppState {
        grid,
        canary,
        watcher,
        data_dir,
    };
    Router::new()
        .route("/", get(|| async { "hubwatch: watching the fleet" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route(
            "/canary",
            post(http::canary_handler).get(http::canary_probe_handler),
        )
        .route("/slack", post(http::slack_handler)) // slash commands
        .route("/sheet/{filename}", get(http::sheet_handler)) // workbook downloads
        .route("/stats/{host}", get(http::stats_handler)) // grid extract
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
