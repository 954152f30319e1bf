//! # smcp-axum
//!
//! Tower middleware for serving OAuth 2.1 protected resources with
//! [axum](https://docs.rs/axum).
//!
//! The request pipeline is assembled from three layers, outermost
//! first:
//!
//! 1. [`SecurityContextLayer`] — attaches a per-request
//!    [`SecurityContext`] (correlation id, client address) and echoes
//!    the correlation id on every response.
//! 2. [`AuthLayer`] + [`BearerAuth`] — extracts the bearer token,
//!    validates it, and populates the context's principal. Failures map
//!    to 401 with a generic body.
//! 3. [`ScopeLayer`] — per-route scope enforcement, mapping denials to
//!    403 with the required scopes.
//!
//! ```rust,ignore
//! use smcp_axum::{
//!     AuthLayer, BearerAuth, ScopeLayer, SecurityContextLayer,
//!     challenge::ResourceServerConfig, metadata::metadata_router,
//! };
//! use smcp_auth::ScopeRequirement;
//!
//! let app = axum::Router::new()
//!     .route("/tools/echo", axum::routing::post(echo))
//!     .route_layer(ScopeLayer::new(ScopeRequirement::one("mcp:read")))
//!     .layer(AuthLayer::new(BearerAuth::new(validator)))
//!     .merge(metadata_router(metadata))
//!     .layer(SecurityContextLayer::new());
//! ```

pub use axum;

pub mod bearer;
pub mod challenge;
pub mod context;
pub mod layer;
pub mod metadata;
pub mod scope;

pub use bearer::BearerAuth;
pub use challenge::ResourceServerConfig;
pub use context::{CORRELATION_ID_HEADER, SecurityContext, SecurityContextLayer};
pub use layer::{AuthFailure, AuthLayer, Authenticator, Validator};
pub use metadata::{ProtectedResourceMetadata, metadata_router};
pub use scope::ScopeLayer;
