//! Authentication middleware.
//!
//! [`AuthLayer`] wraps routes with an [`Authenticator`]. On success the
//! validated [`Principal`] is attached to the request's
//! [`SecurityContext`]; on failure the request is rejected with a 401
//! carrying a generic JSON body — the failure kind goes to the server
//! logs only, so an external caller cannot distinguish a bad token from
//! an unreachable authorization server.

use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{Request, Response, StatusCode, header};
use smcp_auth::{Principal, ValidationFailure};
use thiserror::Error;

use crate::challenge::{ResourceServerConfig, www_authenticate_401};
use crate::context::SecurityContext;

/// Why a request failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// No usable `Authorization: Bearer <token>` header. The token
    /// validator is never invoked in this case.
    #[error("authorization header missing or malformed")]
    MissingCredentials,
    /// The token was extracted but failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
}

impl AuthFailure {
    fn kind(&self) -> &'static str {
        match self {
            AuthFailure::MissingCredentials => "missing_credentials",
            AuthFailure::Invalid(failure) => failure.kind(),
        }
    }

    /// Fixed, generic client-facing message. Never derived from the
    /// underlying failure.
    fn detail(&self) -> &'static str {
        match self {
            AuthFailure::MissingCredentials => "Authentication required",
            AuthFailure::Invalid(_) => "Invalid or expired token",
        }
    }
}

/// Trait for authenticating inbound requests.
///
/// Implementations extract credentials from the request head and
/// produce a validated [`Principal`].
pub trait Authenticator: Clone + Send + Sync + 'static {
    fn authenticate(
        &self,
        parts: &http::request::Parts,
    ) -> impl Future<Output = Result<Principal, AuthFailure>> + Send;
}

/// Trait for validating a bearer credential string.
///
/// The seam between HTTP concerns and token validation; implemented by
/// `smcp_auth::TokenValidator` and by test doubles.
pub trait Validator: Clone + Send + Sync + 'static {
    fn validate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Principal, ValidationFailure>> + Send;
}

impl<K: smcp_auth::KeyStore> Validator for smcp_auth::TokenValidator<K> {
    async fn validate(&self, token: &str) -> Result<Principal, ValidationFailure> {
        smcp_auth::TokenValidator::validate(self, token).await
    }
}

/// Tower [`Layer`](tower::Layer) that applies [`AuthService`].
#[derive(Clone)]
pub struct AuthLayer<A> {
    authenticator: A,
    resource_server: Option<ResourceServerConfig>,
}

impl<A> AuthLayer<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            resource_server: None,
        }
    }

    /// Include RFC 9728 `resource_metadata` in 401 challenges.
    pub fn with_resource_server(mut self, config: ResourceServerConfig) -> Self {
        self.resource_server = Some(config);
        self
    }
}

impl<A, S> tower::Layer<S> for AuthLayer<A>
where
    A: Clone,
{
    type Service = AuthService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            authenticator: self.authenticator.clone(),
            resource_server: self.resource_server.clone(),
            inner,
        }
    }
}

/// Tower service that authenticates requests before forwarding them.
#[derive(Clone)]
pub struct AuthService<A, S> {
    authenticator: A,
    resource_server: Option<ResourceServerConfig>,
    inner: S,
}

impl<A, S, B> tower::Service<Request<B>> for AuthService<A, S>
where
    A: Authenticator,
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
        let authenticator = self.authenticator.clone();
        let resource_server = self.resource_server.clone();
        let mut inner = self.inner.clone();
        // swap to ensure poll_ready state is preserved
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            match authenticator.authenticate(&parts).await {
                Ok(principal) => {
                    attach_principal(&mut parts.extensions, principal);
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(failure) => {
                    let correlation_id = parts
                        .extensions
                        .get::<SecurityContext>()
                        .map(|ctx| ctx.correlation_id.as_str())
                        .unwrap_or("");
                    match &failure {
                        AuthFailure::Invalid(ValidationFailure::KeySourceUnavailable) => {
                            tracing::error!(
                                correlation_id,
                                "rejecting token: authorization server unreachable"
                            );
                        }
                        _ => {
                            tracing::warn!(
                                correlation_id,
                                kind = failure.kind(),
                                "authentication failed"
                            );
                        }
                    }
                    Ok(unauthorized_response(&failure, resource_server.as_ref()))
                }
            }
        })
    }
}

fn attach_principal(extensions: &mut http::Extensions, principal: Principal) {
    match extensions.get_mut::<SecurityContext>() {
        Some(ctx) => ctx.principal = Some(principal),
        // The context layer normally runs outermost; fall back to a
        // minimal context so handlers can still rely on it.
        None => {
            extensions.insert(SecurityContext {
                principal: Some(principal),
                correlation_id: uuid::Uuid::new_v4().to_string(),
                client_address: None,
            });
        }
    }
}

fn unauthorized_response(
    failure: &AuthFailure,
    resource_server: Option<&ResourceServerConfig>,
) -> Response<axum::body::Body> {
    let body = serde_json::json!({ "detail": failure.detail() }).to_string();
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::WWW_AUTHENTICATE, www_authenticate_401(resource_server))
        .body(axum::body::Body::from(body))
        .expect("valid response")
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use chrono::Utc;
    use tower::{Layer, ServiceExt};

    use super::*;
    use crate::bearer::BearerAuth;

    fn principal() -> Principal {
        Principal {
            subject: "user-1".into(),
            issuer: "https://auth.test".into(),
            audience: "smcp-api".into(),
            client_id: None,
            scopes: HashSet::new(),
            expires_at: Utc::now() + chrono::TimeDelta::minutes(10),
            issued_at: None,
            raw_claims: HashMap::new(),
        }
    }

    #[derive(Clone)]
    struct StubValidator {
        calls: Arc<AtomicUsize>,
        outcome: Result<(), ValidationFailure>,
    }

    impl StubValidator {
        fn new(outcome: Result<(), ValidationFailure>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                outcome,
            }
        }
    }

    impl Validator for StubValidator {
        async fn validate(&self, _token: &str) -> Result<Principal, ValidationFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map(|()| principal())
        }
    }

    /// Inner service reporting 200 only when it saw a principal.
    #[derive(Clone)]
    struct EchoPrincipal;

    impl tower::Service<Request<Body>> for EchoPrincipal {
        type Response = Response<Body>;
        type Error = std::convert::Infallible;
        type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Body>) -> Self::Future {
            let authenticated = req
                .extensions()
                .get::<SecurityContext>()
                .is_some_and(|ctx| ctx.principal.is_some());
            let status = if authenticated {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            futures::future::ready(Ok(Response::builder()
                .status(status)
                .body(Body::empty())
                .expect("valid response")))
        }
    }

    fn inner_service() -> EchoPrincipal {
        EchoPrincipal
    }

    #[tokio::test]
    async fn missing_header_rejects_without_invoking_the_validator() {
        let validator = StubValidator::new(Ok(()));
        let calls = validator.calls.clone();
        let service = AuthLayer::new(BearerAuth::new(validator)).layer(inner_service());

        let response = service
            .oneshot(Request::builder().body(Body::empty()).expect("request"))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn wrong_scheme_rejects_without_invoking_the_validator() {
        let validator = StubValidator::new(Ok(()));
        let calls = validator.calls.clone();
        let service = AuthLayer::new(BearerAuth::new(validator)).layer(inner_service());

        let response = service
            .oneshot(
                Request::builder()
                    .header(header::AUTHORIZATION, "Token abc123")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_token_attaches_the_principal() {
        let validator = StubValidator::new(Ok(()));
        let calls = validator.calls.clone();
        let service = AuthLayer::new(BearerAuth::new(validator)).layer(inner_service());

        let response = service
            .oneshot(
                Request::builder()
                    .header(header::AUTHORIZATION, "Bearer some-token")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_failure_maps_to_a_generic_401() {
        let validator = StubValidator::new(Err(ValidationFailure::Expired));
        let service = AuthLayer::new(BearerAuth::new(validator)).layer(inner_service());

        let response = service
            .oneshot(
                Request::builder()
                    .header(header::AUTHORIZATION, "Bearer stale-token")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["detail"], "Invalid or expired token");
    }
}
