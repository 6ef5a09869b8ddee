//! Error types for the auth crate.
//!
//! The login flow fails with one of a closed set of kinds
//! ([`AuthErrorKind`]); infrastructure failures (storage, entropy,
//! configuration, I/O) get their own variants so callers can tell a rejected
//! login apart from a broken environment.

use leave_portal_store::StoreError;

/// Unified error type for the auth subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The callback `state` did not match the pending value, or nothing was
    /// pending.
    #[error("state parameter does not match the pending login request")]
    InvalidState,

    /// No PKCE code verifier was pending when the callback arrived.
    #[error("no PKCE code verifier is pending")]
    MissingVerifier,

    /// The code exchange with the identity server failed.
    #[error("token exchange failed: {reason}")]
    ExchangeFailed {
        /// What went wrong during the exchange.
        reason: String,
    },

    /// The callback was reached without `code` or `state`.
    #[error("callback is missing the code or state parameter")]
    MissingCallbackParams,

    /// The identity server redirected back with an explicit error.
    #[error("identity provider error: {description}")]
    ProviderError {
        /// The provider's `error_description`, kept verbatim.
        description: String,
    },

    /// Reading or writing the session storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The system CSPRNG could not produce random bytes.
    #[error("secure random generator failed")]
    Entropy,

    /// Configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The local callback listener gave up waiting for the redirect.
    #[error("callback timed out after {timeout_secs} seconds")]
    CallbackTimeout {
        /// How long we waited.
        timeout_secs: u64,
    },

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the callback listener.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tag of an [`AuthError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    InvalidState,
    MissingVerifier,
    ExchangeFailed,
    MissingCallbackParams,
    ProviderError,
    Storage,
    Entropy,
    InvalidConfig,
    CallbackTimeout,
    Serialization,
    Io,
}

impl AuthError {
    /// The tag of this error.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::InvalidState => AuthErrorKind::InvalidState,
            Self::MissingVerifier => AuthErrorKind::MissingVerifier,
            Self::ExchangeFailed { .. } => AuthErrorKind::ExchangeFailed,
            Self::MissingCallbackParams => AuthErrorKind::MissingCallbackParams,
            Self::ProviderError { .. } => AuthErrorKind::ProviderError,
            Self::Storage(_) => AuthErrorKind::Storage,
            Self::Entropy => AuthErrorKind::Entropy,
            Self::InvalidConfig { .. } => AuthErrorKind::InvalidConfig,
            Self::CallbackTimeout { .. } => AuthErrorKind::CallbackTimeout,
            Self::Serialization(_) => AuthErrorKind::Serialization,
            Self::Io(_) => AuthErrorKind::Io,
        }
    }
}

impl AuthErrorKind {
    /// Whether this kind belongs to the login flow itself (as opposed to
    /// infrastructure). Flow errors always end with a redirect to login.
    pub fn is_flow_error(self) -> bool {
        matches!(
            self,
            Self::InvalidState
                | Self::MissingVerifier
                | Self::ExchangeFailed
                | Self::MissingCallbackParams
                | Self::ProviderError
        )
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_exchange_failed() {
        let err = AuthError::ExchangeFailed {
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "token exchange failed: connection refused");
    }

    #[test]
    fn error_display_provider_error() {
        let err = AuthError::ProviderError {
            description: "User cancelled".to_string(),
        };
        assert_eq!(err.to_string(), "identity provider error: User cancelled");
    }

    #[test]
    fn error_display_callback_timeout() {
        let err = AuthError::CallbackTimeout { timeout_secs: 300 };
        assert_eq!(err.to_string(), "callback timed out after 300 seconds");
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(AuthError::InvalidState.kind(), AuthErrorKind::InvalidState);
        assert_eq!(
            AuthError::MissingVerifier.kind(),
            AuthErrorKind::MissingVerifier
        );
        assert_eq!(AuthError::Entropy.kind(), AuthErrorKind::Entropy);
        assert_eq!(
            AuthError::InvalidConfig {
                reason: String::new()
            }
            .kind(),
            AuthErrorKind::InvalidConfig
        );
    }

    #[test]
    fn flow_error_classification() {
        assert!(AuthErrorKind::InvalidState.is_flow_error());
        assert!(AuthErrorKind::ProviderError.is_flow_error());
        assert!(AuthErrorKind::MissingCallbackParams.is_flow_error());
        assert!(!AuthErrorKind::Storage.is_flow_error());
        assert!(!AuthErrorKind::CallbackTimeout.is_flow_error());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
    }
}
