use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{file_to_response, lifecycle_error, requested_expiry, secret_hash, FileResponse};
use crate::api::owner::Owner;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated, Pagination};
use crate::api::ttl::TtlUnit;
use crate::storage::NewObject;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateFileRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

async fn text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid {name}: {e}")))
}

// ============================================================================
// Handlers
// ============================================================================

/// Single-shot upload.
/// Route: POST /files
pub async fn create_file(
    State(state): State<Arc<AppState>>,
    Owner(owner_id): Owner,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<FileResponse>>), ApiError> {
    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut name: Option<String> = None;
    let mut password: Option<String> = None;
    let mut time: Option<String> = None;
    let mut unit: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.uploads.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.uploads.max_upload_size
                    )));
                }
                file_data = Some(data);
            }
            "name" => name = Some(text_field(field, "name").await?),
            "password" => password = Some(text_field(field, "password").await?),
            "time" => time = Some(text_field(field, "time").await?),
            "unit" => unit = Some(text_field(field, "unit").await?),
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let time: i64 = time
        .ok_or_else(|| ApiError::bad_request("time field is required"))?
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("time must be an integer"))?;
    let unit: TtlUnit = unit
        .ok_or_else(|| ApiError::bad_request("unit field is required"))?
        .parse()
        .map_err(ApiError::bad_request)?;

    let display_name = name
        .filter(|n| !n.trim().is_empty())
        .or(file_name)
        .ok_or_else(|| ApiError::bad_request("name or file name is required"))?;

    let expiry = requested_expiry(time, unit)?;
    let access_secret = secret_hash(password).await?;

    let object = state
        .lifecycle
        .direct_upload(
            NewObject {
                owner_id,
                display_name,
                expiry,
                access_secret,
            },
            file_data,
        )
        .await
        .map_err(lifecycle_error)?;

    Ok(JSend::created(file_to_response(&object)))
}

/// Route: GET /files/:id
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Owner(owner_id): Owner,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let object = state
        .lifecycle
        .get_owned(&id, owner_id)
        .map_err(lifecycle_error)?;

    Ok(JSend::success(file_to_response(&object)))
}

/// Rename a file.
/// Route: PUT /files/:id
pub async fn update_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Owner(owner_id): Owner,
    AppJson(req): AppJson<UpdateFileRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }

    let object = state
        .lifecycle
        .rename(&id, owner_id, &req.name)
        .map_err(lifecycle_error)?;

    tracing::debug!(object_id = %id, "Renamed file");
    Ok(JSend::success(file_to_response(&object)))
}

/// Route: DELETE /files/:id
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Owner(owner_id): Owner,
) -> Result<Json<JSend<()>>, ApiError> {
    state
        .lifecycle
        .delete_now(&id, owner_id)
        .await
        .map_err(lifecycle_error)?;

    Ok(JSend::success(()))
}

/// Route: GET /files
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Owner(owner_id): Owner,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let mut objects = state
        .lifecycle
        .list_for_owner(owner_id)
        .map_err(lifecycle_error)?;
    objects.sort_by(|a, b| a.expiry.cmp(&b.expiry));

    let total = objects.len() as u64;
    let items: Vec<FileResponse> = objects
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(file_to_response)
        .collect();

    Ok(JSend::paginated(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}
