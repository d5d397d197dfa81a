use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use switchyard_lib::validation::ErrorDetail;
use switchyard_lib::ToggleError;
use thiserror::Error;
use tracing::{error, warn};

/// Everything a handler can fail with, mapped onto the `{details: [{message}]}`
/// error body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Toggle(#[from] ToggleError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,
}

pub type ApiResult<T> = Result<T, ApiError>;

fn details(status: StatusCode, details: Vec<ErrorDetail>) -> Response {
    (status, Json(json!({ "details": details }))).into_response()
}

fn single(status: StatusCode, message: String) -> Response {
    details(status, vec![ErrorDetail { message }])
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Toggle(ToggleError::Validation(e)) => {
                warn!(error = %e, "request failed validation");
                details(StatusCode::BAD_REQUEST, e.details)
            }
            ApiError::Toggle(e @ (ToggleError::NameExists(_)
            | ToggleError::ArchivedNameExists(_)
            | ToggleError::Conflict(_))) => single(StatusCode::CONFLICT, e.to_string()),
            ApiError::Toggle(ToggleError::NotFound(message)) => {
                single(StatusCode::NOT_FOUND, message)
            }
            ApiError::Toggle(ToggleError::Store(e)) => {
                error!(error = %e, "storage failure");
                single(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Unexpected error while talking to storage".to_string(),
                )
            }
            ApiError::BadRequest(message) => {
                warn!(%message, "bad request");
                single(StatusCode::BAD_REQUEST, message)
            }
            e @ ApiError::UnsupportedMediaType => {
                single(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
            }
        }
    }
}
