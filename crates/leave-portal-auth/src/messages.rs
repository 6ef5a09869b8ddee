//! User-facing message table.
//!
//! Maps every [`AuthError`] to the text shown on the callback or login
//! screen. Pure lookup: no formatting of internal details, except for
//! provider errors whose description is shown verbatim.

use std::borrow::Cow;

use crate::error::{AuthError, AuthErrorKind};

/// Shown after a successful login or callback exchange.
pub const LOGIN_SUCCESS: &str = "Login successful";

/// Shown when the callback exchange did not produce a user.
pub const CALLBACK_FAILED: &str = "Failed to complete authentication";

/// Shown when the direct-credential login path fails unexpectedly.
pub const LOGIN_FAILED: &str = "Failed to authenticate";

/// Shown when the user-context list could not be fetched.
pub const CONTEXTS_FAILED: &str = "Failed to load user information";

/// Used when the provider sends `error` without an `error_description`.
pub const PROVIDER_ERROR_FALLBACK: &str = "Authentication failed";

/// Message for a bare error kind.
pub fn kind_message(kind: AuthErrorKind) -> &'static str {
    match kind {
        AuthErrorKind::InvalidState => {
            "The login request could not be verified. Please sign in again."
        }
        AuthErrorKind::MissingVerifier => {
            "No login is in progress for this browser. Please sign in again."
        }
        AuthErrorKind::ExchangeFailed => {
            "The identity server could not complete the sign-in. Please try again."
        }
        AuthErrorKind::MissingCallbackParams => "Missing required authentication parameters",
        AuthErrorKind::ProviderError => PROVIDER_ERROR_FALLBACK,
        AuthErrorKind::CallbackTimeout => "Timed out waiting for the identity server.",
        AuthErrorKind::Storage
        | AuthErrorKind::Entropy
        | AuthErrorKind::InvalidConfig
        | AuthErrorKind::Serialization
        | AuthErrorKind::Io => "Sign-in is unavailable right now. Please try again later.",
    }
}

/// Message for a concrete error.
pub fn user_message(err: &AuthError) -> Cow<'_, str> {
    match err {
        AuthError::ProviderError { description } => Cow::Borrowed(description.as_str()),
        other => Cow::Borrowed(kind_message(other.kind())),
    }
}
