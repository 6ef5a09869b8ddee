//! Route guarding.
//!
//! A [`RouteGuard`] turns the current auth status into one of three
//! decisions: wait for auth to settle, redirect elsewhere, or render the
//! protected view.

use crate::context::{AuthSession, SessionSnapshot};

/// Where unauthenticated users are sent.
pub const LOGIN_PATH: &str = "/login";

/// Where authenticated users lacking a required role are sent.
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// The parts of auth state a guard looks at.
pub trait AuthStatus {
    fn is_authenticated(&self) -> bool;
    fn has_role(&self, role: &str) -> bool;
    fn loading(&self) -> bool;
}

impl AuthStatus for SessionSnapshot {
    fn is_authenticated(&self) -> bool {
        SessionSnapshot::is_authenticated(self)
    }

    fn has_role(&self, role: &str) -> bool {
        SessionSnapshot::has_role(self, role)
    }

    fn loading(&self) -> bool {
        self.loading
    }
}

impl AuthStatus for AuthSession {
    fn is_authenticated(&self) -> bool {
        AuthSession::is_authenticated(self)
    }

    fn has_role(&self, role: &str) -> bool {
        AuthSession::has_role(self, role)
    }

    fn loading(&self) -> bool {
        AuthSession::loading(self)
    }
}

/// Outcome of evaluating a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Auth is still settling; show a placeholder.
    Waiting,
    /// Go elsewhere, replacing the current history entry.
    Redirect { to: &'static str, replace: bool },
    /// Show the protected content.
    Render,
}

/// Protects a view behind authentication and, optionally, a role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGuard {
    pub required_role: Option<String>,
}

impl RouteGuard {
    /// Require authentication only.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Require authentication and `role`.
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            required_role: Some(role.into()),
        }
    }

    pub fn evaluate<S: AuthStatus + ?Sized>(&self, status: &S) -> GuardDecision {
        if status.loading() {
            return GuardDecision::Waiting;
        }
        if !status.is_authenticated() {
            return GuardDecision::Redirect {
                to: LOGIN_PATH,
                replace: true,
            };
        }
        if let Some(role) = &self.required_role
            && !status.has_role(role)
        {
            return GuardDecision::Redirect {
                to: UNAUTHORIZED_PATH,
                replace: true,
            };
        }
        GuardDecision::Render
    }
}
