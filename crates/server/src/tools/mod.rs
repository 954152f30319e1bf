//! The tool endpoints exposed by this server.
//!
//! Each tool is a plain axum handler taking a JSON request body and
//! returning a JSON response. Authentication and scope enforcement
//! happen in middleware; handlers only see already-authorized requests.

pub mod calculator;
pub mod echo;
pub mod timestamp;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// A tool rejected its input. Maps to 400 with a JSON body.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

impl IntoResponse for ToolError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": self.0 })),
        )
            .into_response()
    }
}
