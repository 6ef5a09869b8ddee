//! Anti-CSRF state tokens.
//!
//! A state token is generated per login attempt, stored in the session's
//! pending slot and echoed back by the identity server. Verification is
//! single-use: the pending value is erased by the first check whatever its
//! result, so a captured callback URL cannot be replayed.

use crate::error::Result;
use crate::pkce::random_token;
use crate::session::SessionStore;

/// Bytes of randomness in a state token.
const STATE_BYTES: usize = 24;

/// Generates and verifies state tokens against a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct StateTokenManager {
    session: SessionStore,
}

impl StateTokenManager {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    /// Generate a fresh state token and persist it as the pending value,
    /// replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSPRNG fails or the token cannot be stored.
    pub fn generate_state(&self) -> Result<String> {
        let state = random_token(STATE_BYTES)?;
        self.session.set_pending_state(&state)?;
        Ok(state)
    }

    /// Check `received` against the pending value and erase it.
    ///
    /// Returns `false` when nothing is pending or the storage cannot be read.
    pub fn verify_state(&self, received: &str) -> bool {
        match self.session.take_pending_state() {
            Ok(Some(expected)) => expected == received,
            Ok(None) => {
                tracing::debug!("no pending state to verify against");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read pending state");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trip_is_single_use() {
        let manager = StateTokenManager::new(SessionStore::in_memory());
        let state = manager.generate_state().unwrap();

        assert!(manager.verify_state(&state));
        assert!(!manager.verify_state(&state));
    }

    #[test]
    fn mismatch_still_consumes_pending_value() {
        let manager = StateTokenManager::new(SessionStore::in_memory());
        let state = manager.generate_state().unwrap();

        assert!(!manager.verify_state("forged"));
        assert!(!manager.verify_state(&state));
    }

    #[test]
    fn new_state_overwrites_previous() {
        let manager = StateTokenManager::new(SessionStore::in_memory());
        let first = manager.generate_state().unwrap();
        let second = manager.generate_state().unwrap();

        assert_ne!(first, second);
        assert!(!manager.verify_state(&first));

        let third = manager.generate_state().unwrap();
        assert!(manager.verify_state(&third));
    }

    #[test]
    fn nothing_pending_fails() {
        let manager = StateTokenManager::new(SessionStore::in_memory());
        assert!(!manager.verify_state(""));
    }

    #[test]
    fn state_is_url_safe() {
        let manager = StateTokenManager::new(SessionStore::in_memory());
        let state = manager.generate_state().unwrap();
        assert_eq!(state.len(), 32);
        assert!(
            state
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }
}
