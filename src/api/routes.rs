use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Headroom for multipart boundaries and part headers around a chunk.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.uploads.max_upload_size as usize + MULTIPART_OVERHEAD;
    let chunk_limit = state.config.uploads.max_chunk_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Chunked uploads
        .route("/uploads", post(handlers::begin_upload))
        .route(
            "/uploads/:id/chunks",
            post(handlers::append_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/uploads/:id/finish", post(handlers::finish_upload))
        // Files
        .route("/files", get(handlers::list_files))
        .route(
            "/files",
            post(handlers::create_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/:id", delete(handlers::delete_file))
        .route("/files/:id", get(handlers::get_file))
        .route("/files/:id", put(handlers::update_file))
        // Public download by id
        .route("/downloads/:id", get(handlers::download))
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
