//! Discovery and JWKS fetching.
//!
//! Two network calls against the authorization server: the OpenID
//! discovery document at `{issuer}/.well-known/openid-configuration`,
//! and the JWKS it points at. The discovery document rarely changes and
//! is cached in-struct with its own, longer TTL.
//!
//! One attempt per call with a short timeout; no retry or backoff in
//! the request path. Dropping the future cancels the in-flight call.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::keys::KeySet;

/// Subset of the OpenID Provider discovery document this server uses.
#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryDocument {
    pub jwks_uri: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
}

/// Why discovery or key fetching failed.
///
/// The token validator collapses all of these into
/// `ValidationFailure::KeySourceUnavailable` towards callers; the
/// specific cause is for the logs.
#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("discovery request failed: {0}")]
    Discovery(#[source] reqwest::Error),
    #[error("JWKS request failed: {0}")]
    Jwks(#[source] reqwest::Error),
}

/// Fetches the discovery document and signing keys over HTTP.
pub struct KeySourceClient {
    http: reqwest::Client,
    issuer: String,
    key_ttl: Duration,
    discovery_ttl: Duration,
    discovery: RwLock<Option<(DiscoveryDocument, DateTime<Utc>)>>,
}

impl KeySourceClient {
    /// Create a client for the given issuer.
    ///
    /// `timeout` bounds each outbound call; `key_ttl` stamps fetched
    /// key sets; `discovery_ttl` governs how long the discovery
    /// document is reused.
    pub fn new(
        issuer: impl Into<String>,
        timeout: Duration,
        key_ttl: Duration,
        discovery_ttl: Duration,
    ) -> Result<Self, KeySourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(KeySourceError::Client)?;
        Ok(Self {
            http,
            issuer: issuer.into(),
            key_ttl,
            discovery_ttl,
            discovery: RwLock::new(None),
        })
    }

    /// The issuer this client talks to.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Fetch the discovery document, reusing a cached copy while fresh.
    pub async fn discover(&self) -> Result<DiscoveryDocument, KeySourceError> {
        {
            let guard = self.discovery.read().await;
            if let Some((doc, fetched_at)) = guard.as_ref()
                && !self.discovery_stale(*fetched_at)
            {
                return Ok(doc.clone());
            }
        }

        let url = format!(
            "{}/.well-known/openid-configuration",
            self.issuer.trim_end_matches('/')
        );
        let doc: DiscoveryDocument = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(KeySourceError::Discovery)?
            .json()
            .await
            .map_err(KeySourceError::Discovery)?;
        tracing::debug!(jwks_uri = %doc.jwks_uri, "fetched discovery document");

        *self.discovery.write().await = Some((doc.clone(), Utc::now()));
        Ok(doc)
    }

    /// Fetch a fresh key set from the discovered JWKS endpoint.
    pub async fn fetch_keys(&self) -> Result<KeySet, KeySourceError> {
        let doc = self.discover().await?;
        let jwks: JwkSet = self
            .http
            .get(&doc.jwks_uri)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(KeySourceError::Jwks)?
            .json()
            .await
            .map_err(KeySourceError::Jwks)?;
        let set = KeySet::from_jwks(&jwks, self.key_ttl);
        tracing::debug!(keys = set.len(), "fetched JWKS");
        Ok(set)
    }

    fn discovery_stale(&self, fetched_at: DateTime<Utc>) -> bool {
        let ttl = TimeDelta::from_std(self.discovery_ttl).unwrap_or(TimeDelta::MAX);
        match fetched_at.checked_add_signed(ttl) {
            Some(deadline) => Utc::now() >= deadline,
            None => false,
        }
    }
}
