//! Organizational user contexts.
//!
//! After login the portal asks the API which organizational units and roles
//! the user acts under (`GET /v1/me/contexts`). The result only feeds role
//! display, so failures here never fail authentication.

use async_trait::async_trait;
use url::Url;

use crate::types::UserContext;

/// Why a context fetch failed.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Transport or decoding failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("failed to fetch user contexts: HTTP {status}")]
    Status { status: u16 },
}

/// Source of [`UserContext`] lists.
#[async_trait]
pub trait ProfileClient: Send + Sync {
    /// Fetch the ordered context list for the bearer of `token`.
    async fn user_contexts(&self, token: &str) -> Result<Vec<UserContext>, ProfileError>;
}

/// Fetches contexts from the portal API.
pub struct HttpProfileClient {
    client: reqwest::Client,
    contexts_url: Url,
}

impl HttpProfileClient {
    /// `contexts_url` is the full `/v1/me/contexts` URL
    /// (see [`Endpoints::user_contexts`](crate::config::Endpoints)).
    pub fn new(contexts_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), contexts_url)
    }

    pub fn with_client(client: reqwest::Client, contexts_url: Url) -> Self {
        Self {
            client,
            contexts_url,
        }
    }
}

#[async_trait]
impl ProfileClient for HttpProfileClient {
    async fn user_contexts(&self, token: &str) -> Result<Vec<UserContext>, ProfileError> {
        tracing::debug!(url = %self.contexts_url, "fetching user contexts");

        let response = self
            .client
            .get(self.contexts_url.clone())
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProfileError::Status {
                status: status.as_u16(),
            });
        }

        let contexts: Vec<UserContext> = response.json().await?;
        tracing::debug!(count = contexts.len(), "user contexts loaded");
        Ok(contexts)
    }
}

/// Serves a fixed list; for standalone runs without a portal API.
#[derive(Debug, Clone, Default)]
pub struct StaticProfileClient {
    contexts: Vec<UserContext>,
}

impl StaticProfileClient {
    pub fn new(contexts: Vec<UserContext>) -> Self {
        Self { contexts }
    }
}

#[async_trait]
impl ProfileClient for StaticProfileClient {
    async fn user_contexts(&self, _token: &str) -> Result<Vec<UserContext>, ProfileError> {
        Ok(self.contexts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_client_returns_its_list() {
        let ctx = UserContext {
            organizational_unit: "Finance".to_string(),
            role: "employee".to_string(),
            username: "jdoe".to_string(),
        };
        let client = StaticProfileClient::new(vec![ctx.clone()]);
        assert_eq!(client.user_contexts("tok").await.unwrap(), vec![ctx]);
    }

    #[tokio::test]
    async fn default_static_client_is_empty() {
        let client = StaticProfileClient::default();
        assert!(client.user_contexts("tok").await.unwrap().is_empty());
    }

    #[test]
    fn status_error_display() {
        let err = ProfileError::Status { status: 401 };
        assert_eq!(err.to_string(), "failed to fetch user contexts: HTTP 401");
    }
}
