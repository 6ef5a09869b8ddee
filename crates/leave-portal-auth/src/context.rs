//! Application-wide auth session.
//!
//! [`AuthSession`] is the one object the rest of the portal talks to about
//! who is logged in. It wraps an [`AuthClient`], owns the observable
//! [`SessionSnapshot`], loads the user's organizational contexts whenever the
//! user changes, and publishes [`Notice`]s for the UI to show as toasts.
//!
//! Snapshots go out on a `watch` channel (latest value wins); notices go out
//! on a `broadcast` channel (every subscriber sees every notice).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{broadcast, watch};

use crate::client::{AuthClient, LoginOutcome};
use crate::error::Result;
use crate::messages;
use crate::navigation::{NavigationIntent, Navigator};
use crate::profile::ProfileClient;
use crate::types::{LoginCredentials, User, UserContext};

/// Capacity of the notice channel. Slow subscribers lose the oldest notices.
const NOTICE_CAPACITY: usize = 32;

/// Everything the UI needs to render auth-dependent views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    /// An auth operation is in flight.
    pub loading: bool,
    pub user_contexts: Vec<UserContext>,
    pub active_context: Option<UserContext>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user.as_ref().is_some_and(|u| u.has_role(role))
    }
}

/// A transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// The portal's auth session.
pub struct AuthSession {
    client: Arc<AuthClient>,
    profile: Arc<dyn ProfileClient>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<Notice>,
    in_flight: AtomicUsize,
}

impl AuthSession {
    /// Build the session, restoring any stored user.
    ///
    /// Contexts for a restored user are not fetched until [`initialize`]
    /// runs.
    ///
    /// [`initialize`]: Self::initialize
    pub fn new(
        client: Arc<AuthClient>,
        profile: Arc<dyn ProfileClient>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let user = client.get_current_user();
        if let Some(ref u) = user {
            tracing::info!(user_id = %u.id, "restored session");
        }

        let (state, _) = watch::channel(SessionSnapshot {
            user,
            loading: false,
            ..SessionSnapshot::default()
        });
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            client,
            profile,
            navigator,
            state,
            notices,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Fetch contexts for a restored user.
    pub async fn initialize(&self) {
        if let Some(token) = self.current_token() {
            self.load_user_contexts(&token).await;
        }
    }

    // -- Observation --------------------------------------------------------

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Subscribe to notices.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn client(&self) -> &Arc<AuthClient> {
        &self.client
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.state.borrow().has_role(role)
    }

    pub fn user_contexts(&self) -> Vec<UserContext> {
        self.state.borrow().user_contexts.clone()
    }

    pub fn active_context(&self) -> Option<UserContext> {
        self.state.borrow().active_context.clone()
    }

    /// Make the context at `index` active. Returns `false` if out of range.
    pub fn switch_context(&self, index: usize) -> bool {
        self.state.send_if_modified(|s| match s.user_contexts.get(index) {
            Some(ctx) if s.active_context.as_ref() != Some(ctx) => {
                s.active_context = Some(ctx.clone());
                true
            }
            _ => false,
        });
        index < self.state.borrow().user_contexts.len()
    }

    // -- Operations ---------------------------------------------------------

    /// Direct-credential login.
    ///
    /// Returns `true` only when the user is now authenticated. Falling
    /// through to the delegated flow navigates away and returns `false`.
    pub async fn login(&self, credentials: &LoginCredentials) -> bool {
        let _loading = LoadingGuard::enter(self);

        match self.client.login_with_credentials(credentials).await {
            Ok(LoginOutcome::Authenticated(user)) => {
                self.notify(Notice::Success(messages::LOGIN_SUCCESS.to_string()));
                self.set_user(Some(user)).await;
                true
            }
            Ok(LoginOutcome::Redirect(intent)) => {
                self.set_user(None).await;
                self.navigator.navigate(intent);
                false
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), error = %e, "login failed");
                self.notify(Notice::Error(messages::LOGIN_FAILED.to_string()));
                false
            }
        }
    }

    /// Complete the delegated login. Failures are logged, never propagated.
    pub async fn handle_auth_callback(&self, code: &str, state: &str) -> bool {
        let _loading = LoadingGuard::enter(self);

        match self.client.complete_login_from_callback(code, state).await {
            Ok(user) => {
                self.set_user(Some(user)).await;
                true
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), "auth callback rejected");
                false
            }
        }
    }

    /// End the session locally and at the identity server, then show the
    /// login screen.
    pub async fn logout(&self) {
        match self.client.logout() {
            Ok(intent) => self.navigator.navigate(intent),
            Err(e) => tracing::error!(error = %e, "failed to clear stored session"),
        }
        self.set_user(None).await;
        self.navigator.navigate(NavigationIntent::to(crate::guard::LOGIN_PATH));
    }

    /// Start the delegated login and hand the redirect to the navigator.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization request cannot be created.
    pub async fn redirect_to_login(&self) -> Result<()> {
        let intent = self.client.initiate_login()?;
        self.navigator.navigate(intent);
        Ok(())
    }

    // -- Internals ----------------------------------------------------------

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn current_token(&self) -> Option<String> {
        self.state.borrow().user.as_ref().map(|u| u.token.clone())
    }

    /// Replace the user. A different user resets and reloads the contexts.
    async fn set_user(&self, user: Option<User>) {
        let token = user.as_ref().map(|u| u.token.clone());
        let changed = self.state.send_if_modified(|s| {
            if s.user == user {
                return false;
            }
            s.user = user;
            s.user_contexts.clear();
            s.active_context = None;
            true
        });

        if changed && let Some(token) = token {
            self.load_user_contexts(&token).await;
        }
    }

    async fn load_user_contexts(&self, token: &str) {
        let contexts = match self.profile.user_contexts(token).await {
            Ok(contexts) => {
                tracing::debug!(count = contexts.len(), "loaded user contexts");
                contexts
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load user contexts");
                self.notify(Notice::Error(messages::CONTEXTS_FAILED.to_string()));
                Vec::new()
            }
        };

        // The user may have changed while the request was in flight.
        self.state.send_if_modified(|s| {
            if s.user.as_ref().map(|u| u.token.as_str()) != Some(token) {
                return false;
            }
            s.active_context = contexts.first().cloned();
            s.user_contexts = contexts;
            true
        });
    }
}

/// Keeps `loading` raised while at least one operation is in flight.
struct LoadingGuard<'a> {
    session: &'a AuthSession,
}

impl<'a> LoadingGuard<'a> {
    fn enter(session: &'a AuthSession) -> Self {
        session.in_flight.fetch_add(1, Ordering::SeqCst);
        session.state.send_if_modified(|s| !std::mem::replace(&mut s.loading, true));
        Self { session }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.session.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.session
                .state
                .send_if_modified(|s| std::mem::replace(&mut s.loading, false));
        }
    }
}
