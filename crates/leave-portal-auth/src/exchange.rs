//! Authorization-code exchange.
//!
//! The exchange is a pluggable boundary: [`TokenExchanger`] turns a code and
//! its PKCE verifier into a [`User`]. [`HttpTokenExchanger`] talks to a real
//! identity server (token endpoint, then userinfo); [`DemoTokenExchanger`]
//! stands in with a fixed demo identity when no server is available.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::{AuthConfig, Endpoints};
use crate::types::User;

/// Prefix of tokens issued by the demo identity.
pub const DEMO_TOKEN_PREFIX: &str = "mock-jwt-token-";

/// Role granted to the demo identity.
pub const DEMO_ROLE: &str = "employee";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an exchange failed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Transport failure talking to the identity server.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The token endpoint rejected the grant.
    #[error("grant rejected: {reason}")]
    Rejected {
        /// The server's `error_description`, `error`, or status line.
        reason: String,
    },

    /// The userinfo endpoint returned a non-success status.
    #[error("userinfo request failed with HTTP {status}")]
    UserInfo { status: u16 },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Exchanges an authorization code for an authenticated [`User`].
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange `code`, proving possession with `code_verifier`.
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<User, ExchangeError>;
}

// ---------------------------------------------------------------------------
// HTTP exchanger
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// A claim that identity servers send either as a string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    sub: String,
    preferred_username: Option<String>,
    name: Option<String>,
    email: Option<String>,
    role: Option<OneOrMany>,
    roles: Option<OneOrMany>,
}

impl UserInfoResponse {
    fn into_user(self, token: String) -> User {
        let mut roles: Vec<String> = Vec::new();
        for role in self
            .role
            .into_iter()
            .chain(self.roles)
            .flat_map(OneOrMany::into_vec)
        {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        User {
            username: self
                .preferred_username
                .or(self.name)
                .unwrap_or_else(|| self.sub.clone()),
            id: self.sub,
            email: self.email.unwrap_or_default(),
            roles,
            token,
        }
    }
}

/// Exchanges codes against an OAuth 2.0 / OpenID Connect identity server.
pub struct HttpTokenExchanger {
    client: reqwest::Client,
    token_url: Url,
    userinfo_url: Url,
    client_id: String,
    redirect_uri: String,
}

impl HttpTokenExchanger {
    pub fn new(config: &AuthConfig, endpoints: &Endpoints) -> Self {
        Self::with_client(reqwest::Client::new(), config, endpoints)
    }

    /// Use an existing `reqwest::Client` (shared connection pool, proxies).
    pub fn with_client(
        client: reqwest::Client,
        config: &AuthConfig,
        endpoints: &Endpoints,
    ) -> Self {
        Self {
            client,
            token_url: endpoints.token.clone(),
            userinfo_url: endpoints.userinfo.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: endpoints.redirect.to_string(),
        }
    }

    async fn request_token(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        tracing::debug!(token_url = %self.token_url, "exchanging authorization code");

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<TokenResponse>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(err) => err.error_description.unwrap_or(err.error),
            Err(_) => format!("HTTP {status}: {body}"),
        };
        Err(ExchangeError::Rejected { reason })
    }

    async fn fetch_user(&self, tokens: TokenResponse) -> Result<User, ExchangeError> {
        let token_type = tokens.token_type.as_deref().unwrap_or("Bearer");
        if !token_type.eq_ignore_ascii_case("bearer") {
            return Err(ExchangeError::Rejected {
                reason: format!("unsupported token type {token_type}"),
            });
        }

        let response = self
            .client
            .get(self.userinfo_url.clone())
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::UserInfo {
                status: status.as_u16(),
            });
        }

        let info: UserInfoResponse = response.json().await?;
        Ok(info.into_user(tokens.access_token))
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<User, ExchangeError> {
        let tokens = self.request_token(code, code_verifier).await?;
        let user = self.fetch_user(tokens).await?;
        tracing::debug!(user_id = %user.id, "token exchange successful");
        Ok(user)
    }
}

// ---------------------------------------------------------------------------
// Demo exchanger
// ---------------------------------------------------------------------------

/// Build the fixed demo identity with a fresh mock token.
pub fn demo_identity(username: &str) -> User {
    User {
        id: "user-123".to_string(),
        username: username.to_string(),
        email: "demo@example.com".to_string(),
        roles: vec![DEMO_ROLE.to_string()],
        token: format!("{DEMO_TOKEN_PREFIX}{}", uuid::Uuid::now_v7().simple()),
    }
}

/// Accepts any code and returns the demo identity.
#[derive(Debug, Clone, Default)]
pub struct DemoTokenExchanger;

#[async_trait]
impl TokenExchanger for DemoTokenExchanger {
    async fn exchange(&self, _code: &str, _code_verifier: &str) -> Result<User, ExchangeError> {
        tracing::debug!("using demo identity for code exchange");
        Ok(demo_identity("demo_user"))
    }
}
