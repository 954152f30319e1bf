//! Per-route scope enforcement.
//!
//! [`ScopeLayer`] runs after authentication and checks the validated
//! principal against the route's [`ScopeRequirement`]. A denial maps to
//! 403 with the (non-secret) required scopes in the body; a request
//! that reaches this layer without a principal maps to 401.

use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{Request, Response, StatusCode, header};
use smcp_auth::{ScopeDenied, ScopeRequirement};

use crate::challenge::{ResourceServerConfig, www_authenticate_401, www_authenticate_403};
use crate::context::SecurityContext;

/// Tower [`Layer`](tower::Layer) that applies [`ScopeService`].
#[derive(Clone)]
pub struct ScopeLayer {
    requirement: ScopeRequirement,
    resource_server: Option<ResourceServerConfig>,
}

impl ScopeLayer {
    pub fn new(requirement: ScopeRequirement) -> Self {
        Self {
            requirement,
            resource_server: None,
        }
    }

    /// Include RFC 9728 `resource_metadata` in challenges.
    pub fn with_resource_server(mut self, config: ResourceServerConfig) -> Self {
        self.resource_server = Some(config);
        self
    }
}

impl<S> tower::Layer<S> for ScopeLayer {
    type Service = ScopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ScopeService {
            requirement: self.requirement.clone(),
            resource_server: self.resource_server.clone(),
            inner,
        }
    }
}

/// Tower service enforcing a scope requirement.
#[derive(Clone)]
pub struct ScopeService<S> {
    requirement: ScopeRequirement,
    resource_server: Option<ResourceServerConfig>,
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for ScopeService<S>
where
    S: tower::Service<Request<B>, Response = Response<axum::body::Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let requirement = self.requirement.clone();
        let resource_server = self.resource_server.clone();
        let mut inner = self.inner.clone();
        // swap to ensure poll_ready state is preserved
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            let ctx = req.extensions().get::<SecurityContext>();
            let Some(principal) = ctx.and_then(|c| c.principal.as_ref()) else {
                // Scope enforcement without a principal means the auth
                // layer did not run on this route.
                tracing::warn!("scope check reached without an authenticated principal");
                return Ok(unauthenticated_response(resource_server.as_ref()));
            };

            match requirement.check(&principal.scopes) {
                Ok(()) => {
                    tracing::debug!(
                        subject = %principal.subject,
                        required = ?requirement.required(),
                        "scope requirement satisfied"
                    );
                    inner.call(req).await
                }
                Err(denied) => {
                    tracing::warn!(
                        subject = %principal.subject,
                        required = ?denied.required,
                        missing = ?denied.missing,
                        "insufficient scope"
                    );
                    Ok(forbidden_response(&denied, resource_server.as_ref()))
                }
            }
        })
    }
}

fn unauthenticated_response(
    resource_server: Option<&ResourceServerConfig>,
) -> Response<axum::body::Body> {
    let body = serde_json::json!({ "detail": "Authentication required" }).to_string();
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::WWW_AUTHENTICATE, www_authenticate_401(resource_server))
        .body(axum::body::Body::from(body))
        .expect("valid response")
}

fn forbidden_response(
    denied: &ScopeDenied,
    resource_server: Option<&ResourceServerConfig>,
) -> Response<axum::body::Body> {
    let body = serde_json::json!({
        "detail": "Insufficient permissions",
        "required_scopes": denied.required,
    })
    .to_string();
    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::WWW_AUTHENTICATE,
            www_authenticate_403(resource_server, &denied.required),
        )
        .body(axum::body::Body::from(body))
        .expect("valid response")
}
