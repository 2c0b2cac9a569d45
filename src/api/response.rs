//! JSend envelopes and the extractors that reject with them.
//!
//! Success bodies are `{"status":"success","data":...}`. Client errors are
//! `fail` with `data.message`; server errors are `error` with a top-level
//! `message`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }

    pub fn created(data: T) -> (StatusCode, Json<JSend<T>>) {
        (StatusCode::CREATED, Self::success(data))
    }
}

/// One page of a listing plus where it sits in the whole.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub total: u64,
}

pub type JSendPaginated<T> = JSend<Page<T>>;

impl<T: Serialize> JSend<Page<T>> {
    pub fn paginated(items: Vec<T>, pagination: Pagination) -> Json<JSendPaginated<T>> {
        Self::success(Page { items, pagination })
    }
}

#[derive(Serialize)]
struct FailMessage<'a> {
    message: &'a str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ErrorBody<'a> {
    Fail {
        data: FailMessage<'a>,
        status: JSendStatus,
    },
    Error {
        message: &'a str,
        status: JSendStatus,
    },
}

/// Handler error. 4xx codes render as JSend `fail`, 5xx as `error`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = if self.status.is_server_error() {
            ErrorBody::Error {
                message: &self.message,
                status: JSendStatus::Error,
            }
        } else {
            ErrorBody::Fail {
                data: FailMessage {
                    message: &self.message,
                },
                status: JSendStatus::Fail,
            }
        };
        (self.status, Json(body)).into_response()
    }
}

/// `axum::Json` that rejects with a JSend `fail`.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(json_rejection_message(rejection)))?;
        Ok(AppJson(value))
    }
}

fn json_rejection_message(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(err) => format!("Invalid request body: {}", err.body_text()),
        JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON".to_string(),
        JsonRejection::MissingJsonContentType(_) => {
            "Expected Content-Type: application/json".to_string()
        }
        _ => "Could not read request body".to_string(),
    }
}

/// Query-string extractor backed by serde_qs that rejects with a JSend `fail`.
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, ApiError> {
        serde_qs::from_str(parts.uri.query().unwrap_or_default())
            .map(AppQuery)
            .map_err(|e| ApiError::bad_request(format!("Invalid query parameter: {e}")))
    }
}
