//! Identity server and portal configuration.
//!
//! [`AuthConfig`] is resolved once at startup (TOML file, then
//! `LEAVE_PORTAL_*` environment overrides) and handed to the
//! [`AuthClient`](crate::AuthClient) constructor. [`AuthConfig::resolve`]
//! validates it and turns every endpoint into a parsed [`Url`], so request
//! paths never re-read or re-parse configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "LEAVE_PORTAL_";

/// Path of the profile endpoint, relative to `api_base_url`.
const USER_CONTEXTS_PATH: &str = "v1/me/contexts";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Operator-provisioned credential pair for the direct login path.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DemoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemoCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for the delegated login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Root URL of the identity server.
    pub base_url: String,

    /// Authorization endpoint path, relative to `base_url`.
    pub authorize_endpoint: String,

    /// Token endpoint path, relative to `base_url`.
    pub token_endpoint: String,

    /// Userinfo endpoint path, relative to `base_url`.
    pub userinfo_endpoint: String,

    /// End-session endpoint path, relative to `base_url`.
    pub end_session_endpoint: String,

    /// The OAuth client ID registered with the identity server.
    pub client_id: String,

    /// Where the identity server sends the browser back with `code` and `state`.
    pub redirect_uri: String,

    /// Where the identity server sends the browser after ending its session.
    pub post_logout_redirect_uri: String,

    /// Space-separated scopes to request.
    pub scope: String,

    /// Root URL of the portal API (profile contexts).
    pub api_base_url: String,

    /// Simulated latency of the direct-credential login path.
    pub login_delay_ms: u64,

    /// How long the local callback listener waits for the redirect.
    pub callback_timeout_secs: u64,

    /// Demo credential pair. Direct login is disabled when absent.
    pub demo: Option<DemoCredentials>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://co.visual.com".to_string(),
            authorize_endpoint: "security/connect/authorize".to_string(),
            token_endpoint: "security/connect/token".to_string(),
            userinfo_endpoint: "security/connect/userinfo".to_string(),
            end_session_endpoint: "security/connect/endsession".to_string(),
            client_id: "leave-booking-client".to_string(),
            redirect_uri: "http://127.0.0.1:8400/auth-callback".to_string(),
            post_logout_redirect_uri: "http://127.0.0.1:8400".to_string(),
            scope: "openid profile email".to_string(),
            api_base_url: "https://api.example.com".to_string(),
            login_delay_ms: 800,
            callback_timeout_secs: 300,
            demo: None,
        }
    }
}

impl AuthConfig {
    /// Parse a configuration from TOML. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the TOML is malformed.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| AuthError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    /// Load the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Io`] if the file cannot be read and
    /// [`AuthError::InvalidConfig`] if it does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(path = %path.display(), "loaded auth configuration");
        Ok(config)
    }

    /// Apply `LEAVE_PORTAL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (keys include the prefix).
    ///
    /// Empty values are ignored. The demo pair is only replaced when both
    /// `DEMO_USERNAME` and `DEMO_PASSWORD` are present.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };

        let string_fields: [(&str, &mut String); 7] = [
            ("BASE_URL", &mut self.base_url),
            ("CLIENT_ID", &mut self.client_id),
            ("REDIRECT_URI", &mut self.redirect_uri),
            ("POST_LOGOUT_REDIRECT_URI", &mut self.post_logout_redirect_uri),
            ("SCOPE", &mut self.scope),
            ("API_URL", &mut self.api_base_url),
            ("TOKEN_ENDPOINT", &mut self.token_endpoint),
        ];
        for (name, field) in string_fields {
            if let Some(value) = get(name) {
                tracing::debug!(key = name, "configuration override applied");
                *field = value;
            }
        }

        if let Some(ms) = get("LOGIN_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.login_delay_ms = ms;
        }
        if let Some(secs) = get("CALLBACK_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.callback_timeout_secs = secs;
        }

        if let (Some(username), Some(password)) = (get("DEMO_USERNAME"), get("DEMO_PASSWORD")) {
            self.demo = Some(DemoCredentials { username, password });
        }
    }

    /// Simulated delay for the direct-credential path.
    pub fn login_delay(&self) -> Duration {
        Duration::from_millis(self.login_delay_ms)
    }

    /// Check the configuration without keeping the resolved endpoints.
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    /// Validate the configuration and parse every endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] naming the first bad field.
    pub fn resolve(&self) -> Result<Endpoints> {
        if self.client_id.trim().is_empty() {
            return Err(invalid("client_id must not be empty"));
        }
        if self.scope.trim().is_empty() {
            return Err(invalid("scope must not be empty"));
        }

        Ok(Endpoints {
            authorize: join(&self.base_url, &self.authorize_endpoint, "authorize_endpoint")?,
            token: join(&self.base_url, &self.token_endpoint, "token_endpoint")?,
            userinfo: join(&self.base_url, &self.userinfo_endpoint, "userinfo_endpoint")?,
            end_session: join(
                &self.base_url,
                &self.end_session_endpoint,
                "end_session_endpoint",
            )?,
            redirect: parse(&self.redirect_uri, "redirect_uri")?,
            post_logout_redirect: parse(
                &self.post_logout_redirect_uri,
                "post_logout_redirect_uri",
            )?,
            user_contexts: join(&self.api_base_url, USER_CONTEXTS_PATH, "api_base_url")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Resolved endpoints
// ---------------------------------------------------------------------------

/// Every URL the subsystem talks to, parsed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize: Url,
    pub token: Url,
    pub userinfo: Url,
    pub end_session: Url,
    pub redirect: Url,
    pub post_logout_redirect: Url,
    pub user_contexts: Url,
}

fn invalid(reason: impl Into<String>) -> AuthError {
    AuthError::InvalidConfig {
        reason: reason.into(),
    }
}

fn parse(raw: &str, field: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| invalid(format!("{field}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("{field}: unsupported scheme {other}"))),
    }
}

/// `{base}/{path}`, tolerant of slashes on either side.
fn join(base: &str, path: &str, field: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    parse(&joined, field)
}
