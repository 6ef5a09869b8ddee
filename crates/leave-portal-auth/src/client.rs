//! The delegated-login client.
//!
//! [`AuthClient`] drives the OAuth 2.0 authorization code flow with PKCE
//! against the identity server and keeps the result in the session store.
//!
//! # Flow
//!
//! ```text
//! Idle ──build_authorization_url──▶ AwaitingRedirect (verifier + state stored)
//!                                          │
//!                          complete_login_from_callback
//!                                          ▼
//!                                  CallbackReceived
//!                                    │          │
//!                                    ▼          ▼
//!                           Authenticated    Failed(kind) ── retry ──▶ AwaitingRedirect
//!                                    │
//!                                 logout
//!                                    ▼
//!                                  Idle
//! ```
//!
//! Pending values are consumed by the first callback attempt whatever its
//! outcome, so `Failed` holds nothing that a later callback could reuse.

use std::sync::{Arc, Mutex};

use url::Url;

use crate::config::{AuthConfig, Endpoints};
use crate::error::{AuthError, AuthErrorKind, Result};
use crate::exchange::{HttpTokenExchanger, TokenExchanger, demo_identity};
use crate::navigation::NavigationIntent;
use crate::pkce::{CHALLENGE_METHOD, generate_code_challenge, generate_code_verifier};
use crate::session::SessionStore;
use crate::state::StateTokenManager;
use crate::types::{AuthorizationRequest, LoginCredentials, User};

/// Where the login flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlowState {
    Idle,
    AwaitingRedirect,
    CallbackReceived,
    Authenticated,
    Failed(AuthErrorKind),
}

/// Result of the direct-credential login path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The demo pair matched; the user is stored.
    Authenticated(User),
    /// Anything else falls through to the delegated flow.
    Redirect(NavigationIntent),
}

/// Orchestrates the delegated login against the identity server.
pub struct AuthClient {
    config: AuthConfig,
    endpoints: Endpoints,
    session: SessionStore,
    states: StateTokenManager,
    exchanger: Arc<dyn TokenExchanger>,
    flow: Mutex<LoginFlowState>,
}

impl AuthClient {
    /// Create a client with an explicit exchanger.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the configuration does not
    /// resolve.
    pub fn new(
        config: AuthConfig,
        session: SessionStore,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Result<Self> {
        let endpoints = config.resolve()?;
        let flow = if session.load_user().is_some() {
            LoginFlowState::Authenticated
        } else {
            LoginFlowState::Idle
        };

        Ok(Self {
            states: StateTokenManager::new(session.clone()),
            config,
            endpoints,
            session,
            exchanger,
            flow: Mutex::new(flow),
        })
    }

    /// Create a client that exchanges codes against the configured
    /// identity server over HTTP.
    pub fn with_http_exchanger(config: AuthConfig, session: SessionStore) -> Result<Self> {
        let endpoints = config.resolve()?;
        let exchanger = Arc::new(HttpTokenExchanger::new(&config, &endpoints));
        Self::new(config, session, exchanger)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Current position in the login state machine.
    pub fn flow_state(&self) -> LoginFlowState {
        self.flow.lock().map(|f| *f).unwrap_or(LoginFlowState::Idle)
    }

    fn set_flow(&self, next: LoginFlowState) {
        if let Ok(mut flow) = self.flow.lock() {
            tracing::debug!(from = ?*flow, to = ?next, "login flow transition");
            *flow = next;
        }
    }

    // -- Authorization request ----------------------------------------------

    /// Start a new authorization request, replacing any unfinished one.
    fn begin_request(&self) -> Result<AuthorizationRequest> {
        let code_verifier = generate_code_verifier()?;
        self.session.set_pending_verifier(&code_verifier)?;
        let state = self.states.generate_state()?;
        let code_challenge = generate_code_challenge(&code_verifier);

        Ok(AuthorizationRequest {
            code_verifier,
            code_challenge,
            state,
        })
    }

    /// Build the authorization URL for a brand-new login attempt.
    ///
    /// Stores a fresh verifier and state; any earlier unfinished attempt can
    /// no longer complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSPRNG fails or the pending values cannot be
    /// stored.
    pub fn build_authorization_url(&self) -> Result<Url> {
        let request = self.begin_request()?;
        let mut url = self.endpoints.authorize.clone();

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.endpoints.redirect.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &request.state)
            .append_pair("code_challenge", &request.code_challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD);

        self.set_flow(LoginFlowState::AwaitingRedirect);
        Ok(url)
    }

    /// Begin the delegated login.
    ///
    /// The returned intent is the redirect to the identity server; once a
    /// [`Navigator`](crate::Navigator) performs it, the page is gone.
    pub fn initiate_login(&self) -> Result<NavigationIntent> {
        let url = self.build_authorization_url()?;
        tracing::info!(
            authorize_url = %self.endpoints.authorize,
            "redirecting to identity server"
        );
        Ok(NavigationIntent::External(url))
    }

    // -- Callback -----------------------------------------------------------

    /// Finish the delegated login with the `code` and `state` the identity
    /// server sent back.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidState`] if `state` is not the pending value.
    /// - [`AuthError::MissingVerifier`] if no verifier is pending.
    /// - [`AuthError::ExchangeFailed`] if the identity server rejects the
    ///   code or cannot be reached.
    pub async fn complete_login_from_callback(&self, code: &str, state: &str) -> Result<User> {
        self.set_flow(LoginFlowState::CallbackReceived);

        match self.complete_inner(code, state).await {
            Ok(user) => {
                self.set_flow(LoginFlowState::Authenticated);
                tracing::info!(user_id = %user.id, "login completed");
                Ok(user)
            }
            Err(e) => {
                let kind = e.kind();
                self.set_flow(LoginFlowState::Failed(kind));
                if kind.is_flow_error() {
                    tracing::warn!(kind = ?kind, error = %e, "login callback rejected");
                } else {
                    tracing::error!(kind = ?kind, error = %e, "login callback failed");
                }
                Err(e)
            }
        }
    }

    async fn complete_inner(&self, code: &str, state: &str) -> Result<User> {
        // Both slots are consumed here, before anything can fail, so no
        // outcome leaves a reusable verifier or state behind.
        let state_ok = self.states.verify_state(state);
        let verifier = self.session.take_pending_verifier();

        // A bad state is reported even when the verifier slot is unreadable.
        if !state_ok {
            return Err(AuthError::InvalidState);
        }
        let verifier = verifier?.ok_or(AuthError::MissingVerifier)?;

        let user = self
            .exchanger
            .exchange(code, &verifier)
            .await
            .map_err(|e| AuthError::ExchangeFailed {
                reason: e.to_string(),
            })?;

        self.session.save_user(&user)?;
        Ok(user)
    }

    // -- Direct credentials -------------------------------------------------

    /// Direct username/password login.
    ///
    /// Only the operator-provisioned demo pair is accepted here; any other
    /// input (or no configured pair) falls through to the delegated flow.
    pub async fn login_with_credentials(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<LoginOutcome> {
        tokio::time::sleep(self.config.login_delay()).await;

        let matches = self.config.demo.as_ref().is_some_and(|demo| {
            demo.username == credentials.username && demo.password == credentials.password
        });

        if !matches {
            tracing::debug!("direct credentials not accepted, using delegated login");
            return Ok(LoginOutcome::Redirect(self.initiate_login()?));
        }

        let user = demo_identity(&credentials.username);
        self.session.save_user(&user)?;
        self.set_flow(LoginFlowState::Authenticated);
        tracing::info!(user_id = %user.id, "direct login succeeded");
        Ok(LoginOutcome::Authenticated(user))
    }

    // -- Logout -------------------------------------------------------------

    /// The identity server's end-session URL.
    pub fn build_logout_url(&self) -> Url {
        let mut url = self.endpoints.end_session.clone();
        url.query_pairs_mut().append_pair(
            "post_logout_redirect_uri",
            self.endpoints.post_logout_redirect.as_str(),
        );
        url
    }

    /// Clear the session storage and return the end-session redirect.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the session cannot be removed.
    pub fn logout(&self) -> Result<NavigationIntent> {
        self.session.clear_all()?;
        self.set_flow(LoginFlowState::Idle);
        tracing::info!("logged out");
        Ok(NavigationIntent::External(self.build_logout_url()))
    }

    // -- Session queries ----------------------------------------------------

    /// The stored user, or `None` if absent or unreadable.
    pub fn get_current_user(&self) -> Option<User> {
        self.session.load_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_current_user().is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.get_current_user().is_some_and(|u| u.has_role(role))
    }
}
