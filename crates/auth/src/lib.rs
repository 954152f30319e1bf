//! # smcp-auth
//!
//! OAuth 2.1 resource-server building blocks: JWKS discovery and
//! caching, bearer token validation, scope authorization, and dynamic
//! client registration.
//!
//! The pieces compose around two seams:
//!
//! - [`KeyStore`] — the shared verification-key cache. The in-memory
//!   implementation suits a single process; multi-instance deployments
//!   can provide a distributed one.
//! - [`TokenValidator`] — turns a raw bearer token into a [`Principal`]
//!   or a typed [`ValidationFailure`], fetching keys through a
//!   [`KeySourceClient`] on cache miss.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use smcp_auth::{KeySourceClient, MemoryKeyStore, TokenValidator, ValidatorConfig};
//!
//! let source = Arc::new(KeySourceClient::new(
//!     "https://auth.example.com/realms/mcp",
//!     Duration::from_secs(5),
//!     Duration::from_secs(3600),
//!     Duration::from_secs(86400),
//! )?);
//! let validator = TokenValidator::new(
//!     ValidatorConfig::new("https://auth.example.com/realms/mcp", "my-api"),
//!     MemoryKeyStore::new(),
//!     source,
//! );
//! let principal = validator.validate(token).await?;
//! ```

pub mod dcr;
pub mod error;
pub mod keys;
pub mod scope;
pub mod source;
pub mod validator;

pub use dcr::{DcrBootstrapper, DcrError, RegisteredClient};
pub use error::ValidationFailure;
pub use keys::{KeySet, KeyStore, MemoryKeyStore, SigningKey};
pub use scope::{ScopeDenied, ScopeRequirement, authorize};
pub use source::{DiscoveryDocument, KeySourceClient, KeySourceError};
pub use validator::{Principal, TokenValidator, ValidatorConfig};
