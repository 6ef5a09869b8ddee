//! Authentication and session lifecycle for the Leave Portal.
//!
//! This crate implements delegated login against an OpenID Connect style
//! identity server and everything the portal needs around it:
//!
//! - **Authorization code flow with PKCE** (RFC 7636) and a single-use
//!   anti-CSRF state token
//! - **Session persistence** over any [`leave_portal_store::KeyValueStore`]
//! - **Auth session context** with observable snapshots and notices
//! - **Route guarding** and the portal's route table, standalone or mounted
//!   inside a host shell
//! - **Callback handling**, including a one-shot local listener
//!
//! # Architecture
//!
//! ```text
//! AuthSession
//! ├── AuthClient          (authorize URL, callback, logout)
//! │   ├── StateTokenManager
//! │   ├── SessionStore    (KeyValueStore backend)
//! │   └── TokenExchanger  (HTTP or demo)
//! ├── ProfileClient       (organizational contexts)
//! └── Navigator           (performs NavigationIntents)
//!
//! PortalRouter ── RouteGuard ── AuthStatus
//! CallbackServer ── complete_callback
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use leave_portal_auth::{AuthClient, AuthConfig, SessionStore};
//!
//! # fn example() -> leave_portal_auth::Result<()> {
//! let config = AuthConfig::default();
//! let client = AuthClient::with_http_exchanger(config, SessionStore::in_memory())?;
//!
//! let url = client.build_authorization_url()?;
//! println!("open {url}");
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod exchange;
pub mod guard;
pub mod messages;
pub mod navigation;
pub mod pkce;
pub mod profile;
pub mod router;
pub mod session;
pub mod state;
pub mod types;

// Re-export key types at the crate root for convenience.
pub use callback::{CallbackOutcome, CallbackParams, CallbackServer, complete_callback};
pub use client::{AuthClient, LoginFlowState, LoginOutcome};
pub use config::{AuthConfig, DemoCredentials, Endpoints};
pub use context::{AuthSession, Notice, SessionSnapshot};
pub use error::{AuthError, AuthErrorKind, Result};
pub use exchange::{DemoTokenExchanger, ExchangeError, HttpTokenExchanger, TokenExchanger};
pub use guard::{AuthStatus, GuardDecision, RouteGuard};
pub use navigation::{ChannelNavigator, LogNavigator, NavigationIntent, Navigator};
pub use profile::{HttpProfileClient, ProfileClient, ProfileError, StaticProfileClient};
pub use router::{HostNavigation, MountHandle, MountOptions, PortalRouter, Route, RouteChange, RouteView, mount};
pub use session::SessionStore;
pub use state::StateTokenManager;
pub use types::{LoginCredentials, User, UserContext};
