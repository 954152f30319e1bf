//! # smcp-server
//!
//! An OAuth 2.1 protected tool server. Binds the validation and
//! middleware crates to a concrete set of tool endpoints:
//!
//! - `POST /tools/echo`, `POST /tools/timestamp` — require `mcp:read`
//! - `POST /tools/calculate` — requires `mcp:write`
//! - `GET /api/v1/me` — authenticated, no scope requirement
//! - `GET /`, `GET /health`, `GET /.well-known/oauth-protected-resource`
//!   — public

pub mod app;
pub mod config;
pub mod tools;

pub use app::build_router;
pub use config::{Config, ConfigError, LogFormat};
