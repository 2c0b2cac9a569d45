use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{file_to_response, lifecycle_error, requested_expiry, secret_hash, FileResponse};
use crate::api::owner::Owner;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::api::ttl::TtlUnit;
use crate::storage::NewObject;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BeginUploadRequest {
    pub filename: String,
    #[serde(default)]
    pub password: Option<String>,
    pub time: i64,
    pub unit: TtlUnit,
}

#[derive(Debug, Serialize)]
pub struct BeginUploadResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub byte_size: u64,
    pub id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Route: POST /uploads
pub async fn begin_upload(
    State(state): State<Arc<AppState>>,
    Owner(owner_id): Owner,
    AppJson(req): AppJson<BeginUploadRequest>,
) -> Result<(StatusCode, Json<JSend<BeginUploadResponse>>), ApiError> {
    if req.filename.trim().is_empty() {
        return Err(ApiError::bad_request("filename must not be empty"));
    }

    let expiry = requested_expiry(req.time, req.unit)?;
    let access_secret = secret_hash(req.password).await?;

    let id = state
        .lifecycle
        .begin_upload(NewObject {
            owner_id,
            display_name: req.filename,
            expiry,
            access_secret,
        })
        .await
        .map_err(lifecycle_error)?;

    Ok(JSend::created(BeginUploadResponse { id }))
}

/// Route: POST /uploads/:id/chunks
pub async fn append_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Owner(owner_id): Owner,
    mut multipart: Multipart,
) -> Result<Json<JSend<ChunkResponse>>, ApiError> {
    let mut chunk = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        if field.name() == Some("chunk") {
            chunk = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read chunk: {e}")))?,
            );
        }
    }

    let chunk = chunk.ok_or_else(|| ApiError::bad_request("chunk field is required"))?;
    let byte_size = state
        .lifecycle
        .append_chunk(&id, owner_id, &chunk)
        .await
        .map_err(lifecycle_error)?;

    Ok(JSend::success(ChunkResponse { byte_size, id }))
}

/// Route: POST /uploads/:id/finish
pub async fn finish_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Owner(owner_id): Owner,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let object = state
        .lifecycle
        .finish_upload(&id, owner_id)
        .await
        .map_err(lifecycle_error)?;

    tracing::debug!(object_id = %id, "Finished chunked upload");
    Ok(JSend::success(file_to_response(&object)))
}
