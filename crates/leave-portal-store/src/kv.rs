//! The [`KeyValueStore`] abstraction.
//!
//! Mirrors the contract of browser web storage: string keys, string values,
//! synchronous reads and writes. Callers that need structure serialize it
//! themselves.

use std::sync::Arc;

use crate::error::StoreResult;

/// A durable string-to-string store.
///
/// Implementations must be safe to share between tasks. Every call completes
/// synchronously; there are no partial writes visible to readers.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Remove `key` and return the value it held.
    ///
    /// The default implementation is a `get` followed by a `remove`; backends
    /// with a native single-statement form may override it.
    fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self.get(key)?;
        self.remove(key)?;
        Ok(value)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        (**self).remove(key)
    }

    fn take(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).take(key)
    }
}
