//! Failure taxonomy for token validation.
//!
//! Every step of the validation pipeline reports a [`ValidationFailure`]
//! rather than an opaque error, so the HTTP layer can map outcomes to
//! status codes with an exhaustive match. Display messages are safe to
//! show to callers; anything operator-facing goes to the logs instead.

use thiserror::Error;

/// Why a bearer token was rejected.
///
/// All variants map to 401 at the HTTP boundary. [`KeySourceUnavailable`]
/// is indistinguishable from a bad token to external callers but is
/// logged at elevated severity server-side.
///
/// [`KeySourceUnavailable`]: ValidationFailure::KeySourceUnavailable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// The token is not structurally a JWT, or is missing a claim the
    /// server requires (`kid`, `sub`, `exp`).
    #[error("malformed token")]
    MalformedToken,

    /// The `kid` in the token header is absent from the key set, even
    /// after one refresh from the authorization server.
    #[error("unknown signing key")]
    UnknownKeyId,

    /// Signature verification against the resolved key failed.
    #[error("invalid token signature")]
    SignatureInvalid,

    /// The `exp` claim is in the past (beyond the configured leeway).
    #[error("token has expired")]
    Expired,

    /// The `nbf` claim is in the future (beyond the configured leeway).
    #[error("token not yet valid")]
    NotYetValid,

    /// The `iss` claim does not equal the expected issuer.
    #[error("token issuer mismatch")]
    IssuerMismatch,

    /// Neither the `aud` claim nor (when enabled) the `azp` claim
    /// matches the expected audience.
    #[error("token audience mismatch")]
    AudienceMismatch,

    /// The header algorithm is outside the configured allow-list.
    /// Checked before any key lookup.
    #[error("token algorithm not allowed")]
    AlgorithmNotAllowed,

    /// The discovery or JWKS endpoint could not be reached or parsed.
    #[error("authorization server unavailable")]
    KeySourceUnavailable,
}

impl ValidationFailure {
    /// Stable snake_case tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationFailure::MalformedToken => "malformed_token",
            ValidationFailure::UnknownKeyId => "unknown_key_id",
            ValidationFailure::SignatureInvalid => "signature_invalid",
            ValidationFailure::Expired => "expired",
            ValidationFailure::NotYetValid => "not_yet_valid",
            ValidationFailure::IssuerMismatch => "issuer_mismatch",
            ValidationFailure::AudienceMismatch => "audience_mismatch",
            ValidationFailure::AlgorithmNotAllowed => "algorithm_not_allowed",
            ValidationFailure::KeySourceUnavailable => "key_source_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ValidationFailure;

    #[test]
    fn display_messages_carry_no_internals() {
        let message = ValidationFailure::KeySourceUnavailable.to_string();
        assert!(!message.contains("http"));
        assert!(!message.contains("://"));
    }

    #[test]
    fn kind_tags_are_snake_case() {
        assert_eq!(ValidationFailure::UnknownKeyId.kind(), "unknown_key_id");
        assert_eq!(ValidationFailure::Expired.kind(), "expired");
    }
}
