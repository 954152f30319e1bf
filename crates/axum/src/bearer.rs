//! Bearer token extraction.
//!
//! [`BearerAuth`] pulls the token out of `Authorization: Bearer
//! <token>` (scheme keyword case-insensitive) and delegates to a
//! [`Validator`]. A missing or malformed header rejects the request
//! before the validator is ever invoked.

use smcp_auth::Principal;

use crate::layer::{AuthFailure, Authenticator, Validator};

/// Bearer token authenticator wrapping a [`Validator`].
#[derive(Clone)]
pub struct BearerAuth<V> {
    validator: V,
}

impl<V> BearerAuth<V> {
    pub fn new(validator: V) -> Self {
        Self { validator }
    }
}

impl<V> Authenticator for BearerAuth<V>
where
    V: Validator,
{
    async fn authenticate(
        &self,
        parts: &http::request::Parts,
    ) -> Result<Principal, AuthFailure> {
        let token = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(strip_bearer)
            .ok_or(AuthFailure::MissingCredentials)?;

        Ok(self.validator.validate(token).await?)
    }
}

fn strip_bearer(value: &str) -> Option<&str> {
    let (scheme, rest) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() { None } else { Some(token) }
}
