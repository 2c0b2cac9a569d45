use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::lifecycle_error;
use crate::access;
use crate::api::owner::Owner;
use crate::api::response::{ApiError, AppQuery};
use crate::AppState;

/// Header a third party can use instead of the `secret` query parameter.
pub const ACCESS_SECRET_HEADER: &str = "x-access-secret";

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub secret: Option<String>,
}

/// Serve a committed file's content to anyone holding its id.
/// Route: GET /downloads/:id
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    owner: Option<Owner>,
    AppQuery(params): AppQuery<DownloadParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let object = state
        .lifecycle
        .get_for_download(&id)
        .map_err(lifecycle_error)?;

    let secret = headers
        .get(ACCESS_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(params.secret);

    let caller = owner.map(|Owner(owner_id)| owner_id);
    let allowed = {
        let object = object.clone();
        tokio::task::spawn_blocking(move || {
            access::can_download(&object, caller, secret.as_deref())
        })
        .await
        .map_err(|e| ApiError::internal(format!("Access check failed: {e}")))?
    };
    if !allowed {
        return Err(ApiError::forbidden("Access secret required"));
    }

    let blob = state.lifecycle.open_blob(&id).await.map_err(lifecycle_error)?;

    let body = Body::from_stream(ReaderStream::new(blob.reader));
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();

    let mime = mime_guess::from_path(&object.display_name).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        mime.as_ref()
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(blob.len));

    let filename = object.display_name.replace(['"', '\\'], "_");
    let kind = if state.config.downloads.serves_inline(mime.essence_str()) {
        "inline"
    } else {
        "attachment"
    };
    let disposition = format!("{kind}; filename=\"{filename}\"")
        .parse()
        .unwrap_or(HeaderValue::from_static("attachment"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    // Content disappears at expiry; never let intermediaries keep it
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));

    tracing::debug!(object_id = %id, "Serving download");
    Ok(response)
}
