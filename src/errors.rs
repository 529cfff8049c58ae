use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::services::{explorer::ExplorerError, html_injector::InjectError, object_store::StoreError};

/// A lightweight wrapper for request failures that keeps the message local.
///
/// Rendered as a plain-text body so the explorer UI and `curl` users see the
/// message verbatim.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 403 Forbidden
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 502 Bad Gateway, used when a collaborator call fails.
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = self.status.as_u16(), error = %self.message, "request failed");
        } else {
            tracing::debug!(status = self.status.as_u16(), error = %self.message, "request rejected");
        }

        let mut response = (self.status, self.message).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=UTF-8"),
        );
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(_) => AppError::bad_request(err.to_string()),
            StoreError::Io(_) => AppError::internal(err.to_string()),
            StoreError::Signing(_) | StoreError::Backend(_) => AppError::upstream(err.to_string()),
        }
    }
}

impl From<ExplorerError> for AppError {
    fn from(err: ExplorerError) -> Self {
        match err {
            ExplorerError::Malformed(detail) => {
                tracing::error!(%detail, "explorer returned malformed output");
                AppError::internal("Unexpected output from R2Explorer")
            }
            ExplorerError::Unavailable(_) => AppError::upstream(err.to_string()),
        }
    }
}

impl From<InjectError> for AppError {
    fn from(err: InjectError) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let bad: AppError = StoreError::InvalidKey("..".into()).into();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let upstream: AppError = StoreError::Backend("timeout".into()).into();
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn malformed_explorer_output_is_a_500_with_fixed_message() {
        let err: AppError = ExplorerError::Malformed("bad header".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Unexpected output from R2Explorer");
    }

    #[test]
    fn renders_plain_text() {
        let response = AppError::not_found("File not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=UTF-8"
        );
    }
}
