//! OAuth 2.0 Protected Resource Metadata (RFC 9728).
//!
//! Serves the public discovery document at
//! `/.well-known/oauth-protected-resource` so clients can learn how to
//! obtain and present tokens for this resource. No auth required; the
//! content is static, derived from configuration.

use std::sync::Arc;

use axum::{Json, response::IntoResponse};
use serde::{Deserialize, Serialize};

/// Metadata describing this protected resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The authorization server that issues tokens for this resource.
    pub issuer: String,

    /// Canonical identifier of this resource (RFC 8707 `resource`).
    pub resource: String,

    /// Accepted token types; always `["Bearer"]` for this server.
    pub token_types_supported: Vec<String>,

    /// Scopes this resource understands.
    pub scopes_supported: Vec<String>,

    /// Token introspection endpoint, when the deployment exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_introspection_endpoint: Option<String>,

    /// Bearer token presentation methods (e.g. `["header"]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,

    /// Signature algorithms accepted on inbound tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_signing_alg_values_supported: Option<Vec<String>>,
}

/// Create an axum [`Router`](axum::Router) serving the metadata at
/// `/.well-known/oauth-protected-resource`.
///
/// The document is cacheable for an hour; it only changes with a
/// configuration change and restart.
pub fn metadata_router(metadata: ProtectedResourceMetadata) -> axum::Router {
    let metadata = Arc::new(metadata);
    axum::Router::new().route(
        "/.well-known/oauth-protected-resource",
        axum::routing::get(move || {
            let metadata = metadata.clone();
            async move {
                (
                    [(http::header::CACHE_CONTROL, "public, max-age=3600")],
                    Json(metadata.as_ref().clone()),
                )
                    .into_response()
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let metadata = ProtectedResourceMetadata {
            issuer: "https://auth.test/realms/mcp".into(),
            resource: "https://mcp.test".into(),
            token_types_supported: vec!["Bearer".into()],
            scopes_supported: vec!["mcp:read".into()],
            token_introspection_endpoint: None,
            bearer_methods_supported: None,
            resource_signing_alg_values_supported: None,
        };
        let json = serde_json::to_value(&metadata).expect("serializes");
        assert!(json.get("token_introspection_endpoint").is_none());
        assert_eq!(json["token_types_supported"][0], "Bearer");
    }
}
