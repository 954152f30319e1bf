//! Bearer token validation.
//!
//! [`TokenValidator::validate`] runs a strictly ordered pipeline:
//! structural decode, algorithm allow-list, key resolution (with one
//! cache-refresh retry), signature verification, then claim checks.
//! Claims are only inspected after the signature is verified, and a
//! [`Principal`] is only built from a token that passed every step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::Deserialize;

use crate::error::ValidationFailure;
use crate::keys::{KeyStore, SigningKey};
use crate::source::KeySourceClient;

/// Server-held expectations a token is validated against.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Expected `iss` claim, compared exactly.
    pub issuer: String,
    /// Expected audience, matched against `aud` (and optionally `azp`).
    pub audience: String,
    /// Header algorithms accepted before any key lookup.
    pub allowed_algorithms: Vec<Algorithm>,
    /// Symmetric leeway applied to `exp` and `nbf`.
    pub leeway: Duration,
    /// Accept `azp == audience` when `aud` does not match. Some
    /// authorization servers put the client id in `azp` instead of
    /// `aud` for client-credentials tokens.
    pub azp_fallback: bool,
}

impl ValidatorConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            allowed_algorithms: vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512],
            leeway: Duration::from_secs(10),
            azp_fallback: true,
        }
    }
}

/// The validated identity derived from a token. Lives for one request.
#[derive(Clone, Debug)]
pub struct Principal {
    pub subject: String,
    pub issuer: String,
    /// The audience the token was accepted for (the configured value).
    pub audience: String,
    /// `azp` claim, falling back to the `client_id` claim.
    pub client_id: Option<String>,
    pub scopes: HashSet<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    /// Claims not covered by the typed fields, for extensibility.
    pub raw_claims: HashMap<String, serde_json::Value>,
}

impl Principal {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn contains(&self, value: &str) -> bool {
        match self {
            Audience::Single(s) => s == value,
            Audience::Multiple(v) => v.iter().any(|s| s == value),
        }
    }
}

/// Claims as deserialized from the (signature-verified) payload.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    iss: Option<String>,
    aud: Option<Audience>,
    azp: Option<String>,
    client_id: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    scope: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

struct Inner<K> {
    config: ValidatorConfig,
    store: K,
    source: Arc<KeySourceClient>,
}

/// Validates bearer JWTs against a shared key store, refetching keys
/// from the authorization server on a cache miss.
pub struct TokenValidator<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for TokenValidator<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: KeyStore> TokenValidator<K> {
    pub fn new(config: ValidatorConfig, store: K, source: Arc<KeySourceClient>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                source,
            }),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.inner.config
    }

    /// Validate a raw token string into a [`Principal`].
    pub async fn validate(&self, token: &str) -> Result<Principal, ValidationFailure> {
        let header = decode_header(token).map_err(|err| {
            tracing::debug!(error = %err, "token header does not decode");
            ValidationFailure::MalformedToken
        })?;

        // Allow-list before any key lookup; defends against alg
        // confusion and "none"-style signature stripping.
        if !self.inner.config.allowed_algorithms.contains(&header.alg) {
            tracing::warn!(alg = ?header.alg, "token algorithm not in allow-list");
            return Err(ValidationFailure::AlgorithmNotAllowed);
        }

        let Some(kid) = header.kid.as_deref() else {
            tracing::debug!("token header has no kid");
            return Err(ValidationFailure::MalformedToken);
        };

        let key = self.resolve_key(kid).await?;
        let claims = verify_signature(token, header.alg, &key)?;
        let principal = check_claims(&self.inner.config, claims)?;

        tracing::debug!(
            subject = %principal.subject,
            client_id = principal.client_id.as_deref().unwrap_or(""),
            "token validated"
        );
        Ok(principal)
    }

    /// Resolve a key id through the store, refetching from the key
    /// source once on a miss (key rotation).
    async fn resolve_key(&self, kid: &str) -> Result<SigningKey, ValidationFailure> {
        if let Some(key) = self.inner.store.get(kid).await {
            return Ok(key);
        }

        let set = self.inner.source.fetch_keys().await.map_err(|err| {
            tracing::error!(error = %err, kid, "cannot refresh signing keys");
            ValidationFailure::KeySourceUnavailable
        })?;
        self.inner.store.put(set).await;

        match self.inner.store.get(kid).await {
            Some(key) => Ok(key),
            None => {
                tracing::warn!(kid, "kid absent from refreshed key set");
                Err(ValidationFailure::UnknownKeyId)
            }
        }
    }
}

/// Verify the signature over header+payload. Claim checks are disabled
/// here; they run afterwards, in a fixed order, with leeway semantics
/// the server controls.
fn verify_signature(
    token: &str,
    algorithm: Algorithm,
    key: &SigningKey,
) -> Result<RawClaims, ValidationFailure> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<RawClaims>(token, key.decoding_key(), &validation).map_err(|err| {
        match err.kind() {
            ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_)
            | ErrorKind::InvalidToken => {
                tracing::debug!(error = %err, "token payload does not decode");
                ValidationFailure::MalformedToken
            }
            _ => {
                tracing::warn!(kid = %key.key_id, error = %err, "signature verification failed");
                ValidationFailure::SignatureInvalid
            }
        }
    })?;
    Ok(data.claims)
}

/// Validate claims against the configured expectations and build the
/// principal. Runs only on a signature-verified payload.
fn check_claims(
    config: &ValidatorConfig,
    claims: RawClaims,
) -> Result<Principal, ValidationFailure> {
    let now = Utc::now().timestamp();
    let leeway = config.leeway.as_secs() as i64;

    let Some(exp) = claims.exp else {
        tracing::debug!("token has no exp claim");
        return Err(ValidationFailure::MalformedToken);
    };
    if exp + leeway < now {
        return Err(ValidationFailure::Expired);
    }

    if let Some(nbf) = claims.nbf
        && nbf - leeway > now
    {
        return Err(ValidationFailure::NotYetValid);
    }

    match claims.iss.as_deref() {
        Some(iss) if iss == config.issuer => {}
        seen => {
            tracing::warn!(
                seen = seen.unwrap_or(""),
                expected = %config.issuer,
                "issuer mismatch"
            );
            return Err(ValidationFailure::IssuerMismatch);
        }
    }

    let aud_ok = claims
        .aud
        .as_ref()
        .is_some_and(|aud| aud.contains(&config.audience));
    let azp_ok =
        config.azp_fallback && claims.azp.as_deref() == Some(config.audience.as_str());
    if !aud_ok && !azp_ok {
        tracing::warn!(expected = %config.audience, "audience mismatch");
        return Err(ValidationFailure::AudienceMismatch);
    }

    let Some(subject) = claims.sub else {
        tracing::debug!("token has no sub claim");
        return Err(ValidationFailure::MalformedToken);
    };

    let scopes = claims
        .scope
        .as_deref()
        .unwrap_or("")
        .split_whitespace()
        .map(String::from)
        .collect();

    let expires_at =
        DateTime::from_timestamp(exp, 0).ok_or(ValidationFailure::MalformedToken)?;

    Ok(Principal {
        subject,
        issuer: config.issuer.clone(),
        audience: config.audience.clone(),
        client_id: claims.azp.or(claims.client_id),
        scopes,
        expires_at,
        issued_at: claims.iat.and_then(|t| DateTime::from_timestamp(t, 0)),
        raw_claims: claims.extra,
    })
}
