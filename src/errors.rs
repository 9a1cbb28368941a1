//! Error type for the status endpoints.
//!
//! The engine itself never fails a request; the only error a handler
//! produces today is an unknown source id.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Status code plus a message rendered as `{"error", "status"}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// A lookup named something the monitor is not configured with.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_maps_to_404() {
        let err = AppError::not_found("unknown source `X`");
        assert_eq!(err.to_string(), "unknown source `X` (404)");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
