//! Dynamic Client Registration bootstrap (RFC 7591).
//!
//! On startup the server may register itself as an OAuth client with
//! the authorization server, exchanging an initial access token for
//! durable credentials. The result is persisted to a local file with
//! restrictive permissions and reused across restarts; registration
//! only runs when no well-formed record exists.
//!
//! Deployments with static client credentials skip this subsystem
//! entirely. Inbound token validation never needs these credentials.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::{KeySourceClient, KeySourceError};

/// Durable result of a successful client registration.
///
/// `client_secret` and `registration_access_token` are sensitive; the
/// `Debug` impl redacts them and they must never be logged.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_client_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<i64>,
    /// Hostname that performed the registration, for operator forensics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at_host: Option<String>,
}

impl std::fmt::Debug for RegisteredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field(
                "registration_access_token",
                &self.registration_access_token.as_ref().map(|_| "***"),
            )
            .field("registration_client_uri", &self.registration_client_uri)
            .field("registered_at_host", &self.registered_at_host)
            .finish_non_exhaustive()
    }
}

/// Client metadata sent to the registration endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct ClientMetadata {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
}

impl ClientMetadata {
    /// Minimal metadata for a client-credentials-only client.
    pub fn client_credentials(name: impl Into<String>, client_uri: impl Into<String>) -> Self {
        Self {
            client_name: name.into(),
            redirect_uris: Vec::new(),
            grant_types: vec!["client_credentials".into()],
            response_types: vec!["none".into()],
            token_endpoint_auth_method: "client_secret_basic".into(),
            client_uri: Some(client_uri.into()),
            contacts: Vec::new(),
        }
    }
}

/// Why registration bootstrap failed. All variants are fatal to a
/// startup that requires a client identity.
#[derive(Debug, Error)]
pub enum DcrError {
    #[error(
        "no client identity: no persisted registration, no initial access token, \
         and no static credentials configured"
    )]
    NoClientIdentity,
    #[error("authorization server advertises no registration endpoint")]
    NoRegistrationEndpoint,
    #[error("registration endpoint discovery failed: {0}")]
    Discovery(#[source] KeySourceError),
    #[error("registration request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registration rejected with status {0}")]
    Rejected(reqwest::StatusCode),
    #[error("registration has no management URI to operate on")]
    NoManagementUri,
    #[error("failed to read or write the registration record: {0}")]
    Storage(#[from] std::io::Error),
    #[error("registration record is malformed: {0}")]
    Record(#[from] serde_json::Error),
}

/// Registers this server as an OAuth client and manages the persisted
/// record.
pub struct DcrBootstrapper {
    http: reqwest::Client,
    source: Arc<KeySourceClient>,
    client_name: String,
    resource: String,
    record_path: PathBuf,
}

impl DcrBootstrapper {
    pub fn new(
        source: Arc<KeySourceClient>,
        client_name: impl Into<String>,
        resource: impl Into<String>,
        record_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, DcrError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            source,
            client_name: client_name.into(),
            resource: resource.into(),
            record_path: record_path.into(),
        })
    }

    /// Materialize a client identity: reuse the persisted record if it
    /// is well-formed, otherwise register with the initial access
    /// token. With neither, fail — the caller treats this as fatal.
    pub async fn bootstrap(
        &self,
        initial_access_token: Option<&str>,
    ) -> Result<RegisteredClient, DcrError> {
        if let Some(existing) = self.load().await? {
            tracing::info!(client_id = %existing.client_id, "reusing persisted client registration");
            return Ok(existing);
        }

        let token = initial_access_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(DcrError::NoClientIdentity)?;
        self.register(token).await
    }

    /// Load the persisted record. A missing file is `None`; a record
    /// that does not parse is treated as absent so a re-registration
    /// can replace it.
    pub async fn load(&self) -> Result<Option<RegisteredClient>, DcrError> {
        let bytes = match tokio::fs::read(&self.record_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice::<RegisteredClient>(&bytes) {
            Ok(client) => Ok(Some(client)),
            Err(err) => {
                tracing::warn!(
                    path = %self.record_path.display(),
                    error = %err,
                    "persisted registration record is malformed; re-registering"
                );
                Ok(None)
            }
        }
    }

    /// Register with the authorization server and persist the result.
    pub async fn register(&self, initial_access_token: &str) -> Result<RegisteredClient, DcrError> {
        let doc = self.source.discover().await.map_err(DcrError::Discovery)?;
        let endpoint = doc
            .registration_endpoint
            .ok_or(DcrError::NoRegistrationEndpoint)?;

        let metadata = ClientMetadata::client_credentials(&self.client_name, &self.resource);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(initial_access_token)
            .json(&metadata)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(%status, endpoint = %endpoint, "client registration rejected");
            return Err(DcrError::Rejected(status));
        }

        let mut client: RegisteredClient = response.json().await?;
        client.registered_at_host = std::env::var("HOSTNAME").ok();
        self.save(&client).await?;
        tracing::info!(client_id = %client.client_id, "registered new OAuth client");
        Ok(client)
    }

    /// Persist the record with owner-only permissions.
    pub async fn save(&self, client: &RegisteredClient) -> Result<(), DcrError> {
        let bytes = serde_json::to_vec_pretty(client)?;
        tokio::fs::write(&self.record_path, bytes).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                &self.record_path,
                std::fs::Permissions::from_mode(0o600),
            )
            .await?;
        }
        Ok(())
    }

    /// Update the registration via its management URI (RFC 7592).
    pub async fn update(
        &self,
        client: &RegisteredClient,
        updates: &serde_json::Value,
    ) -> Result<RegisteredClient, DcrError> {
        let uri = client
            .registration_client_uri
            .as_deref()
            .ok_or(DcrError::NoManagementUri)?;

        let mut request = self.http.put(uri).json(updates);
        if let Some(token) = client.registration_access_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DcrError::Rejected(status));
        }

        let updated: RegisteredClient = response.json().await?;
        self.save(&updated).await?;
        Ok(updated)
    }

    /// Delete the registration and remove the local record.
    pub async fn deregister(&self, client: &RegisteredClient) -> Result<(), DcrError> {
        let uri = client
            .registration_client_uri
            .as_deref()
            .ok_or(DcrError::NoManagementUri)?;

        let mut request = self.http.delete(uri);
        if let Some(token) = client.registration_access_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DcrError::Rejected(status));
        }

        match tokio::fs::remove_file(&self.record_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}
