//! `WWW-Authenticate` challenges for 401 and 403 responses.
//!
//! Per [RFC 6750 §3](https://datatracker.ietf.org/doc/html/rfc6750#section-3)
//! and [RFC 9728 §5.1](https://datatracker.ietf.org/doc/html/rfc9728#name-www-authenticate-response):
//! challenges point clients at the Protected Resource Metadata document
//! and name the scopes the resource expects.

use http::HeaderValue;

/// Challenge configuration for a server acting as an OAuth 2.1
/// resource server.
#[derive(Clone, Debug)]
pub struct ResourceServerConfig {
    /// URL of the Protected Resource Metadata document (RFC 9728),
    /// included as `resource_metadata="..."`.
    pub resource_metadata_url: String,
    /// Scopes advertised in 401 challenges.
    pub default_scope: Option<String>,
}

/// Build the `WWW-Authenticate` value for a 401 response.
///
/// Format: `Bearer resource_metadata="<url>"[, scope="<scopes>"]`, or a
/// bare `Bearer` when no metadata is configured.
pub fn www_authenticate_401(config: Option<&ResourceServerConfig>) -> HeaderValue {
    let Some(config) = config else {
        return HeaderValue::from_static("Bearer");
    };
    let mut value = format!(
        "Bearer resource_metadata=\"{}\"",
        config.resource_metadata_url,
    );
    if let Some(ref scope) = config.default_scope {
        value.push_str(&format!(", scope=\"{scope}\""));
    }
    // Safe: we control the format and it's valid ASCII.
    HeaderValue::from_str(&value).expect("valid WWW-Authenticate header")
}

/// Build the `WWW-Authenticate` value for a 403 `insufficient_scope`
/// response, naming the scopes the route requires.
pub fn www_authenticate_403(
    config: Option<&ResourceServerConfig>,
    required_scopes: &[String],
) -> HeaderValue {
    let scope = required_scopes.join(" ");
    let mut value = format!("Bearer error=\"insufficient_scope\", scope=\"{scope}\"");
    if let Some(config) = config {
        value.push_str(&format!(
            ", resource_metadata=\"{}\"",
            config.resource_metadata_url,
        ));
    }
    HeaderValue::from_str(&value).expect("valid WWW-Authenticate header")
}
