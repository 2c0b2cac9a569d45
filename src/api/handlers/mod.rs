mod downloads;
mod files;
mod health;
mod uploads;

use chrono::Utc;
use serde::Serialize;

use crate::api::response::ApiError;
use crate::api::ttl::TtlUnit;
use crate::lifecycle::LifecycleError;
use crate::storage::ObjectRecord;

pub use downloads::download;
pub use files::{create_file, delete_file, get_file, list_files, update_file};
pub use health::health;
pub use uploads::{append_chunk, begin_upload, finish_upload};

/// Map a LifecycleError to an ApiError
fn lifecycle_error(e: LifecycleError) -> ApiError {
    match e {
        LifecycleError::NotFound => ApiError::not_found("File not found"),
        LifecycleError::InvalidTarget => ApiError::bad_request("Metadata does not match"),
        LifecycleError::ChunkTooLarge { .. } => ApiError::payload_too_large(e.to_string()),
        LifecycleError::LifetimeExceeded => ApiError::bad_request(e.to_string()),
        LifecycleError::Storage(_) | LifecycleError::BlobIo(_) => {
            tracing::error!(error = %e, "Lifecycle operation failed");
            ApiError::internal(e.to_string())
        }
    }
}

/// Turn a `time` + `unit` pair into an absolute expiry.
fn requested_expiry(time: i64, unit: TtlUnit) -> Result<chrono::DateTime<Utc>, ApiError> {
    unit.expiry_after(time, Utc::now())
        .ok_or_else(|| ApiError::bad_request("Duration too long"))
}

/// Hash the optional access secret from a request; empty means none.
async fn secret_hash(secret: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    // PBKDF2 is CPU-bound, run it on the blocking pool
    tokio::task::spawn_blocking(move || crate::access::hash_secret(&secret))
        .await
        .map_err(|e| ApiError::internal(format!("Unable to hash access secret: {e}")))?
        .map(Some)
        .map_err(|e| ApiError::internal(format!("Unable to hash access secret: {e}")))
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub created_at: String,
    pub download_path: String,
    pub expiry: String,
    pub id: String,
    pub name: String,
    pub protected: bool,
    pub updated_at: String,
}

fn file_to_response(object: &ObjectRecord) -> FileResponse {
    FileResponse {
        created_at: object.created_at.to_rfc3339(),
        download_path: format!("/downloads/{}", object.id),
        expiry: object.expiry.to_rfc3339(),
        id: object.id.clone(),
        name: object.display_name.clone(),
        protected: object.access_secret.is_some(),
        updated_at: object.updated_at.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};

    use super::downloads::{DownloadParams, ACCESS_SECRET_HEADER};
    use super::files::{ListFilesParams, UpdateFileRequest};
    use super::uploads::BeginUploadRequest;
    use super::*;
    use crate::api::owner::Owner;
    use crate::api::response::{AppJson, AppQuery};
    use crate::testutil::test_state;

    fn begin_request(filename: &str) -> BeginUploadRequest {
        BeginUploadRequest {
            filename: filename.to_string(),
            password: None,
            time: 10,
            unit: TtlUnit::Minutes,
        }
    }

    fn status_of(err: ApiError) -> StatusCode {
        err.status()
    }

    #[tokio::test]
    async fn chunked_upload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (code, body) = begin_upload(
            State(state.clone()),
            Owner(1),
            AppJson(begin_request("notes.txt")),
        )
        .await
        .unwrap();
        assert_eq!(code, StatusCode::CREATED);
        let id = body.0.data.id.clone();

        state.lifecycle.append_chunk(&id, 1, b"abc").await.unwrap();

        let finished = finish_upload(State(state.clone()), Path(id.clone()), Owner(1))
            .await
            .unwrap();
        assert_eq!(finished.0.data.name, "notes.txt");
        assert!(!finished.0.data.protected);
        assert_eq!(finished.0.data.download_path, format!("/downloads/{id}"));

        let listed = list_files(
            State(state.clone()),
            Owner(1),
            AppQuery(ListFilesParams { limit: 20, offset: 0 }),
        )
        .await
        .unwrap();
        assert_eq!(listed.0.data.pagination.total, 1);
        assert_eq!(listed.0.data.items[0].id, id);
    }

    #[tokio::test]
    async fn begin_rejects_lifetime_beyond_policy() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut req = begin_request("big.iso");
        req.time = 400;
        req.unit = TtlUnit::Days;
        let err = begin_upload(State(state.clone()), Owner(1), AppJson(req))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
        assert!(state.lifecycle.list_for_owner(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn password_marks_file_protected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut req = begin_request("secret.txt");
        req.password = Some("letmein".to_string());
        let (_, body) = begin_upload(State(state.clone()), Owner(1), AppJson(req))
            .await
            .unwrap();
        let id = body.0.data.id.clone();

        let finished = finish_upload(State(state.clone()), Path(id.clone()), Owner(1))
            .await
            .unwrap();
        assert!(finished.0.data.protected);

        let stored = state.lifecycle.db().get_object(&id).unwrap().unwrap();
        let hash = stored.access_secret.unwrap();
        assert_ne!(hash, "letmein");
        assert!(crate::access::verify_secret(&hash, "letmein"));
    }

    #[tokio::test]
    async fn other_owner_cannot_see_rename_or_delete() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (_, body) = begin_upload(State(state.clone()), Owner(1), AppJson(begin_request("a.txt")))
            .await
            .unwrap();
        let id = body.0.data.id.clone();
        finish_upload(State(state.clone()), Path(id.clone()), Owner(1))
            .await
            .unwrap();

        let err = get_file(State(state.clone()), Path(id.clone()), Owner(2))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);

        let err = update_file(
            State(state.clone()),
            Path(id.clone()),
            Owner(2),
            AppJson(UpdateFileRequest {
                name: "stolen.txt".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);

        let err = delete_file(State(state.clone()), Path(id.clone()), Owner(2))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);

        let file = get_file(State(state.clone()), Path(id.clone()), Owner(1))
            .await
            .unwrap();
        assert_eq!(file.0.data.name, "a.txt");
    }

    #[tokio::test]
    async fn finish_by_other_owner_is_invalid_target() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (_, body) = begin_upload(State(state.clone()), Owner(1), AppJson(begin_request("a.txt")))
            .await
            .unwrap();
        let err = finish_upload(State(state.clone()), Path(body.0.data.id.clone()), Owner(2))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_chunk_maps_to_payload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let id = state
            .lifecycle
            .begin_upload(crate::storage::NewObject {
                owner_id: 1,
                display_name: "x".to_string(),
                expiry: Utc::now() + chrono::Duration::minutes(5),
                access_secret: None,
            })
            .await
            .unwrap();

        let too_big = vec![0u8; state.config.uploads.max_chunk_size as usize + 1];
        let err = state
            .lifecycle
            .append_chunk(&id, 1, &too_big)
            .await
            .unwrap_err();
        assert_eq!(status_of(lifecycle_error(err)), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn download_checks_secret_and_streams_content() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut req = begin_request("report.txt");
        req.password = Some("open sesame".to_string());
        let (_, body) = begin_upload(State(state.clone()), Owner(1), AppJson(req))
            .await
            .unwrap();
        let id = body.0.data.id.clone();
        state.lifecycle.append_chunk(&id, 1, b"quarterly").await.unwrap();

        let no_secret = || AppQuery(DownloadParams { secret: None });

        // Pending objects are not downloadable, even by their owner
        let err = download(
            State(state.clone()),
            Path(id.clone()),
            Some(Owner(1)),
            no_secret(),
            HeaderMap::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);

        finish_upload(State(state.clone()), Path(id.clone()), Owner(1))
            .await
            .unwrap();

        let err = download(
            State(state.clone()),
            Path(id.clone()),
            None,
            no_secret(),
            HeaderMap::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(status_of(err), StatusCode::FORBIDDEN);

        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_SECRET_HEADER, "open sesame".parse().unwrap());
        let response = download(State(state.clone()), Path(id), None, no_secret(), headers)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "text/plain"
        );
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.txt\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"quarterly");
    }

    #[tokio::test]
    async fn configured_types_are_served_inline() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let (_, body) = begin_upload(State(state.clone()), Owner(1), AppJson(begin_request("photo.png")))
            .await
            .unwrap();
        let id = body.0.data.id.clone();
        state.lifecycle.append_chunk(&id, 1, b"\x89PNG").await.unwrap();
        finish_upload(State(state.clone()), Path(id.clone()), Owner(1))
            .await
            .unwrap();

        let response = download(
            State(state.clone()),
            Path(id),
            None,
            AppQuery(DownloadParams { secret: None }),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "image/png"
        );
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_DISPOSITION],
            "inline; filename=\"photo.png\""
        );
    }
}
