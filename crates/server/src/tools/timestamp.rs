//! Timestamp tool: the current time in a requested zone and format.

use axum::Json;
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::ToolError;

fn default_format() -> String {
    "%Y-%m-%d %H:%M:%S %Z".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TimestampRequest {
    /// IANA timezone name, e.g. `Europe/Berlin`. Unknown names fall
    /// back to UTC rather than failing the request.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub include_epoch: bool,
}

#[derive(Debug, Serialize)]
pub struct TimestampResponse {
    pub timestamp: String,
    pub timezone: String,
    pub iso8601: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch_seconds: Option<i64>,
}

pub async fn timestamp(
    Json(req): Json<TimestampRequest>,
) -> Result<Json<TimestampResponse>, ToolError> {
    let now = Utc::now();
    let (zone_name, formatted, iso) = match req.timezone.as_deref() {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => {
                let local = now.with_timezone(&tz);
                (
                    tz.name().to_string(),
                    render(&local, &req.format),
                    local.to_rfc3339(),
                )
            }
            Err(_) => {
                tracing::debug!(timezone = name, "unknown timezone, using UTC");
                ("UTC".to_string(), render(&now, &req.format), now.to_rfc3339())
            }
        },
        None => ("UTC".to_string(), render(&now, &req.format), now.to_rfc3339()),
    };

    Ok(Json(TimestampResponse {
        timestamp: formatted,
        timezone: zone_name,
        iso8601: iso,
        epoch_seconds: req.include_epoch.then(|| now.timestamp()),
    }))
}

/// Format a time with a user-supplied strftime string. chrono panics on
/// some invalid specifiers only at write time, so render through `write!`
/// and fall back to RFC 3339 when the format string is unusable.
fn render<Tz: chrono::TimeZone>(time: &chrono::DateTime<Tz>, format: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    use std::fmt::Write;

    let mut out = String::new();
    match write!(out, "{}", time.format(format)) {
        Ok(()) => out,
        Err(_) => time.to_rfc3339(),
    }
}
