//! Echo tool: returns the message with some metadata about it.

use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ToolError;

#[derive(Debug, Deserialize)]
pub struct EchoRequest {
    pub message: String,
    #[serde(default)]
    pub uppercase: bool,
    #[serde(default)]
    pub timestamp: bool,
}

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub original: String,
    pub echo: String,
    pub metadata: EchoMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EchoMetadata {
    pub length: usize,
    pub words: usize,
    pub uppercase_applied: bool,
}

pub async fn echo(Json(req): Json<EchoRequest>) -> Result<Json<EchoResponse>, ToolError> {
    if req.message.is_empty() {
        return Err(ToolError::new("message must not be empty"));
    }

    let echoed = if req.uppercase {
        req.message.to_uppercase()
    } else {
        req.message.clone()
    };

    let metadata = EchoMetadata {
        length: req.message.chars().count(),
        words: req.message.split_whitespace().count(),
        uppercase_applied: req.uppercase,
    };

    Ok(Json(EchoResponse {
        original: req.message,
        echo: echoed,
        metadata,
        timestamp: req.timestamp.then(|| Utc::now().to_rfc3339()),
    }))
}
