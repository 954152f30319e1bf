//! Router assembly.
//!
//! Routes are grouped by the scope they require and each group gets its
//! own [`ScopeLayer`], then everything protected sits behind a single
//! [`AuthLayer`]. The security context layer wraps the lot, public
//! routes included, so every response carries a correlation id.

use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use smcp_auth::{KeyStore, ScopeRequirement, TokenValidator};
use smcp_axum::challenge::ResourceServerConfig;
use smcp_axum::context::SecurityContextLayer;
use smcp_axum::metadata::{ProtectedResourceMetadata, metadata_router};
use smcp_axum::{AuthLayer, BearerAuth, ScopeLayer, SecurityContext};

use crate::config::Config;
use crate::tools;

/// Build the full application router.
pub fn build_router<K: KeyStore>(config: &Config, validator: TokenValidator<K>) -> Router {
    let resource_server = resource_server_config(config);

    let read_routes = Router::new()
        .route("/tools/echo", post(tools::echo::echo))
        .route("/tools/timestamp", post(tools::timestamp::timestamp))
        .route_layer(
            ScopeLayer::new(ScopeRequirement::one("mcp:read"))
                .with_resource_server(resource_server.clone()),
        );

    let write_routes = Router::new()
        .route("/tools/calculate", post(tools::calculator::calculate))
        .route_layer(
            ScopeLayer::new(ScopeRequirement::one("mcp:write"))
                .with_resource_server(resource_server.clone()),
        );

    // Authenticated but not scope-gated.
    let identity_routes = Router::new().route("/api/v1/me", get(whoami));

    let protected = read_routes
        .merge(write_routes)
        .merge(identity_routes)
        .route_layer(
            AuthLayer::new(BearerAuth::new(validator)).with_resource_server(resource_server),
        );

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(metadata_router(protected_resource_metadata(config)))
        .merge(protected)
        .layer(SecurityContextLayer::new())
}

fn resource_server_config(config: &Config) -> ResourceServerConfig {
    ResourceServerConfig {
        resource_metadata_url: format!(
            "{}/.well-known/oauth-protected-resource",
            config.resource.trim_end_matches('/')
        ),
        default_scope: config.supported_scopes.first().cloned(),
    }
}

fn protected_resource_metadata(config: &Config) -> ProtectedResourceMetadata {
    ProtectedResourceMetadata {
        issuer: config.issuer.clone(),
        resource: config.resource.clone(),
        token_types_supported: vec!["Bearer".to_string()],
        scopes_supported: config.supported_scopes.clone(),
        token_introspection_endpoint: config.introspection_endpoint.clone(),
        bearer_methods_supported: Some(vec!["header".to_string()]),
        resource_signing_alg_values_supported: Some(config.allowed_algorithms.clone()),
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "smcp-server",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "metadata": "/.well-known/oauth-protected-resource",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Who the token says the caller is. Useful for debugging a client's
/// credential setup without exposing anything the caller doesn't
/// already hold.
async fn whoami(Extension(ctx): Extension<SecurityContext>) -> Json<serde_json::Value> {
    let principal = ctx.principal.as_ref();
    Json(serde_json::json!({
        "subject": principal.map(|p| p.subject.clone()),
        "issuer": principal.map(|p| p.issuer.clone()),
        "client_id": principal.and_then(|p| p.client_id.clone()),
        "scopes": principal.map(|p| {
            let mut scopes: Vec<_> = p.scopes.iter().cloned().collect();
            scopes.sort();
            scopes
        }),
        "expires_at": principal.map(|p| p.expires_at.to_rfc3339()),
        "correlation_id": ctx.correlation_id,
    }))
}
