//! Response shapes: JSON error envelope, plain-text errors, JSON success bodies.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use hublink_github::GitHubError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub const NOT_CONNECTED_ID: &str = "not_connected";

/// How a route reports its errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    Plain,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("You must connect your account to GitHub first.")]
    NotConnected,

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("{0}")]
    Internal(String),

    #[error("This plugin is not configured.")]
    NotConfigured,

    #[error("Request timed out.")]
    Timeout,

    #[error("{0}")]
    MethodNotAllowed(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotConnected | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotConfigured => StatusCode::NOT_IMPLEMENTED,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            ApiError::NotConnected => NOT_CONNECTED_ID,
            _ => "",
        }
    }

    pub fn into_json(self) -> Response {
        let status = self.status();
        let body = json!({
            "id": self.id(),
            "message": self.to_string(),
            "status_code": status.as_u16(),
        });
        (status, axum::Json(body)).into_response()
    }

    pub fn into_plain(self) -> Response {
        plain(self.status(), self.to_string())
    }

    pub fn respond(self, kind: ResponseKind) -> Response {
        match kind {
            ResponseKind::Json => self.into_json(),
            ResponseKind::Plain => self.into_plain(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_json()
    }
}

impl From<GitHubError> for ApiError {
    fn from(e: GitHubError) -> Self {
        ApiError::Upstream {
            status: e.status().unwrap_or(500),
            message: e.to_string(),
        }
    }
}

/// Plain-text error body with a trailing newline.
pub fn plain(status: StatusCode, message: impl Into<String>) -> Response {
    let mut body = message.into();
    body.push('\n');
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Serialize a success body. A value that cannot be encoded becomes a bare
/// 500.
pub fn write_json<T: Serialize + ?Sized>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
