pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::cv::handlers::{self as cv, MAX_UPLOAD_BYTES};
use crate::runs::handlers as runs;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // CV API
        .route("/api/v1/cv/parse", post(cv::handle_parse_cv))
        .route("/api/v1/cv/upload", post(cv::handle_upload_cv))
        // Run API
        .route(
            "/api/v1/runs",
            post(runs::handle_start_run).get(runs::handle_list_runs),
        )
        .route("/api/v1/runs/sync", post(runs::handle_run_sync))
        .route(
            "/api/v1/runs/:id",
            get(runs::handle_get_run).delete(runs::handle_cancel_run),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
