//! Verification key storage.
//!
//! A [`KeySet`] is a snapshot of the authorization server's published
//! signing keys, keyed by `kid`. Sets are replaced wholesale on refresh,
//! never merged, so concurrent readers always see keys from a single
//! discovery response.
//!
//! The [`KeyStore`] trait is the capability the token validator depends
//! on. A miss never triggers a fetch here; populating the store is the
//! validator's job. [`MemoryKeyStore`] is the single-process
//! implementation; multi-instance deployments can back the same trait
//! with a shared cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::jwk::{JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

/// A public verification key fetched from the JWKS endpoint.
///
/// Immutable once fetched; superseded only by replacing the whole
/// [`KeySet`].
#[derive(Clone)]
pub struct SigningKey {
    /// Key id, unique within its set.
    pub key_id: String,
    /// Algorithm advertised by the JWK, if it maps to a signature
    /// algorithm. The algorithm actually used for verification comes
    /// from the (allow-listed) token header.
    pub algorithm: Option<Algorithm>,
    /// When this key was fetched.
    pub fetched_at: DateTime<Utc>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Key material usable with `jsonwebtoken::decode`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

/// An immutable snapshot of verification keys with an expiry.
#[derive(Clone, Debug)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
    expires_at: DateTime<Utc>,
}

impl KeySet {
    /// Build a key set from a JWKS document.
    ///
    /// Keys without a `kid` or with unusable material are skipped; the
    /// authorization server may publish encryption keys alongside
    /// signing keys.
    pub fn from_jwks(jwks: &JwkSet, ttl: Duration) -> Self {
        let fetched_at = Utc::now();
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            let Some(key_id) = jwk.common.key_id.clone() else {
                tracing::debug!("skipping JWK without kid");
                continue;
            };
            let decoding_key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(err) => {
                    tracing::debug!(kid = %key_id, error = %err, "skipping unusable JWK");
                    continue;
                }
            };
            let algorithm = jwk.common.key_algorithm.and_then(signature_algorithm);
            keys.insert(
                key_id.clone(),
                SigningKey {
                    key_id,
                    algorithm,
                    fetched_at,
                    decoding_key,
                },
            );
        }
        let expires_at = fetched_at
            .checked_add_signed(ttl_delta(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { keys, expires_at }
    }

    pub fn get(&self, key_id: &str) -> Option<&SigningKey> {
        self.keys.get(key_id)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[cfg(test)]
    fn expire_now(&mut self) {
        self.expires_at = Utc::now() - TimeDelta::seconds(1);
    }
}

fn ttl_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}

fn signature_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Capability trait for the shared key cache.
///
/// Implementations must support concurrent reads and an atomic
/// whole-set replacement. A `get` miss carries no error: an expired or
/// absent set is simply a miss, and the caller decides whether to
/// refetch.
pub trait KeyStore: Send + Sync + 'static {
    /// Look up a key by id. Expired sets count as a miss.
    fn get(&self, key_id: &str) -> impl Future<Output = Option<SigningKey>> + Send;

    /// Replace the stored set atomically.
    fn put(&self, keys: KeySet) -> impl Future<Output = ()> + Send;

    /// Drop the stored set.
    fn invalidate(&self) -> impl Future<Output = ()> + Send;
}

/// In-memory key store for single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    inner: Arc<RwLock<Option<KeySet>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    async fn get(&self, key_id: &str) -> Option<SigningKey> {
        let guard = self.inner.read().await;
        let set = guard.as_ref()?;
        if set.is_expired() {
            return None;
        }
        set.get(key_id).cloned()
    }

    async fn put(&self, keys: KeySet) {
        *self.inner.write().await = Some(keys);
    }

    async fn invalidate(&self) {
        *self.inner.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_key_set(ttl: Duration) -> KeySet {
        let jwk: serde_json::Value =
            serde_json::from_str(include_str!("../tests/fixtures/rsa_public.jwk.json"))
                .expect("fixture parses");
        let jwks: JwkSet =
            serde_json::from_value(serde_json::json!({ "keys": [jwk] })).expect("valid JWKS");
        KeySet::from_jwks(&jwks, ttl)
    }

    #[test]
    fn from_jwks_indexes_by_kid() {
        let set = fixture_key_set(Duration::from_secs(60));
        assert_eq!(set.len(), 1);
        let key = set.get("test-key-1").expect("key present");
        assert_eq!(key.algorithm, Some(Algorithm::RS256));
        assert!(set.get("other-key").is_none());
    }

    #[test]
    fn from_jwks_skips_keys_without_kid() {
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{ "kty": "RSA", "n": "AQAB", "e": "AQAB" }]
        }))
        .expect("valid JWKS");
        let set = KeySet::from_jwks(&jwks, Duration::from_secs(60));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn store_round_trip() {
        let store = MemoryKeyStore::new();
        assert!(store.get("test-key-1").await.is_none());

        store.put(fixture_key_set(Duration::from_secs(60))).await;
        assert!(store.get("test-key-1").await.is_some());
        assert!(store.get("missing").await.is_none());

        store.invalidate().await;
        assert!(store.get("test-key-1").await.is_none());
    }

    #[tokio::test]
    async fn expired_set_is_a_miss() {
        let store = MemoryKeyStore::new();
        let mut set = fixture_key_set(Duration::from_secs(60));
        set.expire_now();
        store.put(set).await;
        assert!(store.get("test-key-1").await.is_none());
    }

    #[tokio::test]
    async fn put_replaces_wholesale() {
        let store = MemoryKeyStore::new();
        store.put(fixture_key_set(Duration::from_secs(60))).await;

        // A replacement set without the old kid supersedes it entirely.
        let empty: JwkSet = serde_json::from_value(serde_json::json!({ "keys": [] })).unwrap();
        store
            .put(KeySet::from_jwks(&empty, Duration::from_secs(60)))
            .await;
        assert!(store.get("test-key-1").await.is_none());
    }
}
