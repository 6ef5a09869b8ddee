//! Core data types shared by the auth subsystem.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An authenticated identity.
///
/// Only built from a successful code exchange, a successful direct-credential
/// login, or a stored session record. The serialized form is what the
/// session storage keeps under the current-user key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque identifier from the identity server.
    pub id: String,
    pub username: String,
    pub email: String,
    /// Role names granted to the user. May be empty.
    pub roles: Vec<String>,
    /// Opaque bearer credential for downstream APIs.
    pub token: String,
}

impl User {
    /// Whether `role` is among this user's roles.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// UserContext
// ---------------------------------------------------------------------------

/// An organizational role binding returned by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub organizational_unit: String,
    pub role: String,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Login inputs
// ---------------------------------------------------------------------------

/// Username/password pair for the direct-credential login path.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An in-flight delegated login attempt.
///
/// The verifier and state stay on the client; only the challenge and state
/// travel to the identity server.
#[derive(Clone)]
pub struct AuthorizationRequest {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("state", &"<redacted>")
            .finish()
    }
}
