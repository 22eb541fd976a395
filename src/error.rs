//! 统一的 API 错误类型与转换，响应只包含状态码。

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::config::AUTH_REALM;
use crate::storage::UploadError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest,
    NotFound,
    Unauthorized,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest => StatusCode::BAD_REQUEST.into_response(),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_LENGTH, HeaderValue::from_static("0"))],
            )
                .into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM))],
            )
                .into_response(),
            ApiError::Internal(msg) => {
                debug!(error = msg, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        ApiError::Internal(error.to_string())
    }
}
