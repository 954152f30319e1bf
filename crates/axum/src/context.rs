//! Per-request security context and correlation tracking.
//!
//! [`SecurityContextLayer`] runs outermost: it attaches a
//! [`SecurityContext`] to every request before auth runs and echoes the
//! correlation id on every response — failed requests must still be
//! traceable. The auth layer later fills in the principal; handlers
//! read the context via `Extension<SecurityContext>` and treat it as
//! read-only.

use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use http::{HeaderValue, Request, Response};
use smcp_auth::Principal;

/// Inbound/outbound correlation id header.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request-scoped security state.
///
/// `principal` is either fully populated by the auth layer or absent;
/// it is never partially filled in.
#[derive(Clone, Debug)]
pub struct SecurityContext {
    pub principal: Option<Principal>,
    pub correlation_id: String,
    pub client_address: Option<String>,
}

/// Tower [`Layer`](tower::Layer) that applies [`SecurityContextService`].
#[derive(Clone, Debug, Default)]
pub struct SecurityContextLayer;

impl SecurityContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> tower::Layer<S> for SecurityContextLayer {
    type Service = SecurityContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityContextService { inner }
    }
}

/// Attaches the security context and emits an access log event.
#[derive(Clone)]
pub struct SecurityContextService<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for SecurityContextService<S>
where
    S: tower::Service<Request<B>, Response = Response<axum::body::Body>>
        + Clone
        + Send
        + 'static,
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

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let mut inner = self.inner.clone();
        // swap to ensure poll_ready state is preserved
        std::mem::swap(&mut self.inner, &mut inner);

        let correlation_id = inbound_correlation_id(&req)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let client_address = client_address(&req);
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        req.extensions_mut().insert(SecurityContext {
            principal: None,
            correlation_id: correlation_id.clone(),
            client_address,
        });

        Box::pin(async move {
            let started = Instant::now();
            let mut response = inner.call(req).await?;

            // is_well_formed guarantees visible ASCII.
            let header = HeaderValue::from_str(&correlation_id)
                .expect("correlation id is a valid header value");
            response
                .headers_mut()
                .insert(CORRELATION_ID_HEADER, header);

            tracing::info!(
                correlation_id = %correlation_id,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                duration_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );
            Ok(response)
        })
    }
}

fn inbound_correlation_id<B>(req: &Request<B>) -> Option<String> {
    let value = req
        .headers()
        .get(CORRELATION_ID_HEADER)?
        .to_str()
        .ok()?
        .trim();
    if is_well_formed(value) {
        Some(value.to_string())
    } else {
        None
    }
}

/// A usable correlation id: non-empty, bounded, visible ASCII.
fn is_well_formed(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value.bytes().all(|b| (0x21..=0x7e).contains(&b))
}

/// Client address, honoring reverse-proxy forwarding headers before
/// falling back to the socket peer.
fn client_address<B>(req: &Request<B>) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    if let Some(real_ip) = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
    {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return Some(real_ip.to_string());
        }
    }
    req.extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_accepts_uuids() {
        assert!(is_well_formed("9b2e9e2e-6a0f-4c3e-8e7f-5c1d2a3b4c5d"));
    }

    #[test]
    fn well_formed_rejects_empty_and_oversized() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed(&"x".repeat(129)));
    }

    #[test]
    fn well_formed_rejects_control_characters() {
        assert!(!is_well_formed("abc\r\ndef"));
        assert!(!is_well_formed("abc def"));
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_address(&req).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn real_ip_is_second_choice() {
        let req = Request::builder()
            .header("x-real-ip", "198.51.100.7")
            .body(())
            .unwrap();
        assert_eq!(client_address(&req).as_deref(), Some("198.51.100.7"));
    }
}
