//! Server configuration.
//!
//! Every option is settable by flag or environment variable. Startup
//! validation is fatal: the server refuses to serve with an incoherent
//! client-identity configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use jsonwebtoken::Algorithm;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// OAuth 2.1 protected tool server.
#[derive(Clone, Debug, Parser)]
#[command(name = "smcp-server", version, about)]
pub struct Config {
    /// Expected token issuer; also the base URL for OIDC discovery.
    #[arg(long, env = "SMCP_ISSUER")]
    pub issuer: String,

    /// Expected audience (`aud`, or `azp` when the fallback is on).
    #[arg(long, env = "SMCP_AUDIENCE")]
    pub audience: String,

    /// Canonical identifier of this resource server.
    #[arg(long, env = "SMCP_RESOURCE")]
    pub resource: String,

    /// Accepted token signature algorithms.
    #[arg(
        long,
        env = "SMCP_ALLOWED_ALGORITHMS",
        default_value = "RS256,RS384,RS512",
        value_delimiter = ','
    )]
    pub allowed_algorithms: Vec<String>,

    /// Leeway applied symmetrically to `exp` and `nbf`.
    #[arg(long, env = "SMCP_CLOCK_SKEW_LEEWAY_SECS", default_value_t = 10)]
    pub clock_skew_leeway_secs: u64,

    /// How long fetched signing keys stay fresh.
    #[arg(long, env = "SMCP_KEY_CACHE_TTL_SECS", default_value_t = 3600)]
    pub key_cache_ttl_secs: u64,

    /// How long the discovery document stays fresh.
    #[arg(long, env = "SMCP_DISCOVERY_CACHE_TTL_SECS", default_value_t = 86400)]
    pub discovery_cache_ttl_secs: u64,

    /// Timeout for each discovery/JWKS/registration call.
    #[arg(long, env = "SMCP_KEY_SOURCE_TIMEOUT_SECS", default_value_t = 5)]
    pub key_source_timeout_secs: u64,

    /// Accept `azp` equal to the audience when `aud` does not match.
    #[arg(
        long,
        env = "SMCP_AZP_FALLBACK",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub azp_fallback: bool,

    /// Register this server as an OAuth client at startup (DCR).
    #[arg(
        long,
        env = "SMCP_USE_DCR",
        default_value_t = false,
        action = ArgAction::Set
    )]
    pub use_dcr: bool,

    /// Initial access token for dynamic client registration.
    #[arg(long, env = "SMCP_DCR_INITIAL_ACCESS_TOKEN", hide_env_values = true)]
    pub dcr_initial_access_token: Option<String>,

    /// Where the registration record is persisted.
    #[arg(long, env = "SMCP_DCR_CLIENT_FILE", default_value = ".dcr_client.json")]
    pub dcr_client_file: PathBuf,

    /// Static client id (when not using DCR).
    #[arg(long, env = "SMCP_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Static client secret (when not using DCR).
    #[arg(long, env = "SMCP_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Scopes advertised by the metadata endpoint.
    #[arg(
        long,
        env = "SMCP_SUPPORTED_SCOPES",
        default_value = "mcp:read,mcp:write,mcp:infer",
        value_delimiter = ','
    )]
    pub supported_scopes: Vec<String>,

    /// Token introspection endpoint to advertise, if any.
    #[arg(long, env = "SMCP_INTROSPECTION_ENDPOINT")]
    pub introspection_endpoint: Option<String>,

    /// Listen address.
    #[arg(long, env = "SMCP_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Log output format.
    #[arg(long, env = "SMCP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Client name used when registering via DCR.
    #[arg(long, env = "SMCP_APP_NAME", default_value = "smcp-server")]
    pub app_name: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a static client id is required when DCR is disabled")]
    MissingClientId,
    #[error("allowed algorithm list must not be empty")]
    NoAlgorithms,
    #[error("unknown signature algorithm: {0}")]
    UnknownAlgorithm(String),
}

impl Config {
    /// Validate cross-field constraints. Called once at startup; any
    /// error is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.use_dcr && self.client_id.is_none() {
            return Err(ConfigError::MissingClientId);
        }
        self.parsed_algorithms().map(|_| ())
    }

    /// The algorithm allow-list as `jsonwebtoken` algorithms.
    pub fn parsed_algorithms(&self) -> Result<Vec<Algorithm>, ConfigError> {
        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        self.allowed_algorithms
            .iter()
            .map(|name| {
                name.trim()
                    .parse::<Algorithm>()
                    .map_err(|_| ConfigError::UnknownAlgorithm(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "smcp-server",
            "--issuer",
            "https://auth.test/realms/mcp",
            "--audience",
            "smcp-api",
            "--resource",
            "https://mcp.test",
        ]
    }

    #[test]
    fn static_client_id_required_without_dcr() {
        let config = Config::parse_from(base_args());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingClientId)
        ));
    }

    #[test]
    fn static_client_id_satisfies_validation() {
        let mut args = base_args();
        args.extend(["--client-id", "static-client"]);
        let config = Config::parse_from(args);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dcr_mode_needs_no_static_id() {
        let mut args = base_args();
        args.extend(["--use-dcr", "true"]);
        let config = Config::parse_from(args);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_algorithms_parse() {
        let mut args = base_args();
        args.extend(["--client-id", "c"]);
        let config = Config::parse_from(args);
        let algorithms = config.parsed_algorithms().expect("parses");
        assert_eq!(
            algorithms,
            vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512]
        );
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let mut args = base_args();
        args.extend(["--client-id", "c", "--allowed-algorithms", "RS256,none"]);
        let config = Config::parse_from(args);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownAlgorithm(name)) if name == "none"
        ));
    }

    #[test]
    fn supported_scopes_split_on_commas() {
        let mut args = base_args();
        args.extend(["--client-id", "c", "--supported-scopes", "a:x,b:y"]);
        let config = Config::parse_from(args);
        assert_eq!(config.supported_scopes, vec!["a:x", "b:y"]);
    }
}
