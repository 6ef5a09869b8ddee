//! Typed view over the durable key/value storage.
//!
//! Three plain-string entries make up the client-side auth state:
//!
//! | key             | contents                         |
//! |-----------------|----------------------------------|
//! | `auth_state`    | pending anti-CSRF state token    |
//! | `code_verifier` | pending PKCE code verifier       |
//! | `currentUser`   | JSON-serialized [`User`]         |
//!
//! A readable, parseable `currentUser` entry is what "logged in" means.

use std::fmt;
use std::sync::Arc;

use leave_portal_store::{KeyValueStore, MemoryStore};

use crate::error::Result;
use crate::types::User;

/// Storage key for the pending state token.
pub const STATE_KEY: &str = "auth_state";

/// Storage key for the pending PKCE verifier.
pub const VERIFIER_KEY: &str = "code_verifier";

/// Storage key for the serialized current user.
pub const USER_KEY: &str = "currentUser";

/// Session persistence for the auth subsystem.
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Wrap a storage backend.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// A session store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    // -- Current user -------------------------------------------------------

    /// Read the stored user.
    ///
    /// Never fails: a missing entry, a storage error and malformed JSON all
    /// read as "no session".
    pub fn load_user(&self) -> Option<User> {
        let raw = match self.storage.get(USER_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session storage");
                return None;
            }
        };

        match serde_json::from_str::<User>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "stored session is malformed, ignoring it");
                None
            }
        }
    }

    /// Persist `user` as the current session.
    pub fn save_user(&self, user: &User) -> Result<()> {
        let raw = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &raw)?;
        tracing::debug!(user_id = %user.id, "session saved");
        Ok(())
    }

    /// Remove the current session.
    pub fn clear_user(&self) -> Result<()> {
        self.storage.remove(USER_KEY)?;
        tracing::debug!("session cleared");
        Ok(())
    }

    /// Remove the session and any unfinished authorization request.
    pub fn clear_all(&self) -> Result<()> {
        self.clear_user()?;
        for key in [STATE_KEY, VERIFIER_KEY] {
            self.storage.remove(key)?;
        }
        tracing::debug!("pending request cleared");
        Ok(())
    }

    // -- Pending authorization request --------------------------------------

    /// Store the pending state token, replacing any previous one.
    pub fn set_pending_state(&self, state: &str) -> Result<()> {
        self.storage.set(STATE_KEY, state)?;
        Ok(())
    }

    /// Remove and return the pending state token.
    pub fn take_pending_state(&self) -> Result<Option<String>> {
        Ok(self.storage.take(STATE_KEY)?)
    }

    /// Store the pending code verifier, replacing any previous one.
    pub fn set_pending_verifier(&self, verifier: &str) -> Result<()> {
        self.storage.set(VERIFIER_KEY, verifier)?;
        Ok(())
    }

    /// Remove and return the pending code verifier.
    pub fn take_pending_verifier(&self) -> Result<Option<String>> {
        Ok(self.storage.take(VERIFIER_KEY)?)
    }

    /// Whether a state token or verifier is still stored.
    pub fn has_pending_request(&self) -> bool {
        [STATE_KEY, VERIFIER_KEY]
            .iter()
            .any(|key| matches!(self.storage.get(key), Ok(Some(_))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "user-123".to_string(),
            username: "demo_user".to_string(),
            email: "demo@example.com".to_string(),
            roles: vec!["employee".to_string()],
            token: "tok".to_string(),
        }
    }

    #[test]
    fn missing_session_is_none() {
        let session = SessionStore::in_memory();
        assert!(session.load_user().is_none());
    }

    #[test]
    fn save_and_load_user() {
        let session = SessionStore::in_memory();
        session.save_user(&user()).unwrap();
        assert_eq!(session.load_user(), Some(user()));
    }

    #[test]
    fn malformed_session_is_none() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(USER_KEY, "{not json").unwrap();
        let session = SessionStore::new(storage);
        assert!(session.load_user().is_none());
    }

    #[test]
    fn partial_user_record_is_none() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(USER_KEY, r#"{"id":"user-123"}"#).unwrap();
        let session = SessionStore::new(storage);
        assert!(session.load_user().is_none());
    }

    #[test]
    fn clear_all_removes_pending_request() {
        let session = SessionStore::in_memory();
        session.save_user(&user()).unwrap();
        session.set_pending_state("s").unwrap();
        session.set_pending_verifier("v").unwrap();

        session.clear_all().unwrap();
        assert!(session.load_user().is_none());
        assert!(!session.has_pending_request());
    }

    #[test]
    fn clear_user_keeps_pending_request() {
        let session = SessionStore::in_memory();
        session.save_user(&user()).unwrap();
        session.set_pending_state("s").unwrap();
        session.set_pending_verifier("v").unwrap();

        session.clear_user().unwrap();
        assert!(session.load_user().is_none());
        assert!(session.has_pending_request());
    }

    #[test]
    fn pending_values_are_single_use() {
        let session = SessionStore::in_memory();
        session.set_pending_state("s").unwrap();
        session.set_pending_verifier("v").unwrap();
        assert!(session.has_pending_request());

        assert_eq!(session.take_pending_state().unwrap().as_deref(), Some("s"));
        assert_eq!(
            session.take_pending_verifier().unwrap().as_deref(),
            Some("v")
        );
        assert!(session.take_pending_state().unwrap().is_none());
        assert!(session.take_pending_verifier().unwrap().is_none());
        assert!(!session.has_pending_request());
    }

    #[test]
    fn clones_share_backend() {
        let a = SessionStore::in_memory();
        let b = a.clone();
        a.save_user(&user()).unwrap();
        assert!(b.load_user().is_some());
    }
}
