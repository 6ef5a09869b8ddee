//! # leave-portal-store
//!
//! Durable client-side storage for the Leave Portal session layer.
//!
//! The auth subsystem keeps three plain-string entries (pending state token,
//! pending PKCE verifier, serialized current user) in a [`KeyValueStore`].
//! Two backends are provided:
//!
//! - [`SqliteStore`]: file-backed with WAL, survives restarts.
//! - [`MemoryStore`]: process-lifetime only.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use leave_portal_store::{KeyValueStore, SqliteStore};
//!
//! # fn example() -> leave_portal_store::StoreResult<()> {
//! let store = SqliteStore::open("data/session.db")?;
//! store.set("currentUser", "{}")?;
//! assert!(store.get("currentUser")?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod kv;
pub mod memory;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
