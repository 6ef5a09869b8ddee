//! Portal routes and the embedding contract.
//!
//! The portal either owns the whole page (standalone, base path `/`) or is
//! mounted by a host shell under a path prefix. In both cases routes are
//! resolved relative to the base path. A mounted portal receives navigation
//! requests from its host over an `mpsc` channel and publishes every
//! resulting [`RouteChange`] on a `watch` channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::context::AuthSession;
use crate::guard::{AuthStatus, GuardDecision, RouteGuard};
use crate::navigation::NavigationIntent;

/// Role required for the leave booking page.
pub const LEAVE_ROLE: &str = "employee";

/// Capacity of the host navigation channel created by [`mount`].
const HOST_CHANNEL_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Route table
// ---------------------------------------------------------------------------

/// Every view the portal can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Unauthorized,
    AuthCallback,
    Home,
    Leave,
    NotFound,
}

impl Route {
    /// Canonical portal-relative path. `NotFound` has none.
    pub fn path(self) -> Option<&'static str> {
        match self {
            Self::Login => Some("/login"),
            Self::Unauthorized => Some("/unauthorized"),
            Self::AuthCallback => Some("/auth-callback"),
            Self::Home => Some("/"),
            Self::Leave => Some("/leave"),
            Self::NotFound => None,
        }
    }

    /// Match a portal-relative path. Query and fragment are ignored.
    pub fn from_path(path: &str) -> Self {
        match normalize(path).as_str() {
            "/login" => Self::Login,
            "/unauthorized" => Self::Unauthorized,
            "/auth-callback" => Self::AuthCallback,
            "/" => Self::Home,
            "/leave" => Self::Leave,
            _ => Self::NotFound,
        }
    }

    /// The guard protecting this route, if any.
    pub fn guard(self) -> Option<RouteGuard> {
        match self {
            Self::Home => Some(RouteGuard::authenticated()),
            Self::Leave => Some(RouteGuard::with_role(LEAVE_ROLE)),
            _ => None,
        }
    }

    pub fn is_public(self) -> bool {
        self.guard().is_none()
    }
}

/// Leading slash, no query or fragment, no trailing slash except on root.
fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

// ---------------------------------------------------------------------------
// Mounting
// ---------------------------------------------------------------------------

/// How the portal is placed in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Path prefix owned by the portal, normalized without trailing slash
    /// (`/` when standalone).
    pub base_path: String,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self::standalone()
    }
}

impl MountOptions {
    pub fn standalone() -> Self {
        Self {
            base_path: "/".to_string(),
        }
    }

    /// Mounted under `base_path` inside a host.
    pub fn mounted(base_path: &str) -> Self {
        Self {
            base_path: normalize(base_path),
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.base_path == "/"
    }

    /// Turn a host path into a portal-relative path, or `None` if the host
    /// path lies outside the portal.
    pub fn strip_base(&self, host_path: &str) -> Option<String> {
        let host_path = normalize(host_path);
        if self.is_standalone() {
            return Some(host_path);
        }
        let rest = host_path.strip_prefix(&self.base_path)?;
        match rest {
            "" => Some("/".to_string()),
            r if r.starts_with('/') => Some(r.to_string()),
            _ => None,
        }
    }

    /// Turn a portal-relative path into a host path.
    pub fn to_host_path(&self, path: &str) -> String {
        let path = normalize(path);
        match (self.is_standalone(), path.as_str()) {
            (true, _) => path,
            (false, "/") => self.base_path.clone(),
            (false, p) => format!("{}{p}", self.base_path),
        }
    }
}

// ---------------------------------------------------------------------------
// Route changes
// ---------------------------------------------------------------------------

/// A navigation request from the host shell. `path` is portal-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNavigation {
    pub path: String,
}

impl HostNavigation {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// What to put on screen for a resolved route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteView {
    /// Auth is settling; show a loading placeholder.
    Waiting,
    Render,
}

/// The portal's current location after guards have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub route: Route,
    /// Portal-relative path actually shown.
    pub path: String,
    /// The same location in the host's path space.
    pub host_path: String,
    pub view: RouteView,
    /// Replace the current history entry instead of pushing.
    pub replace: bool,
    /// The requested path when a guard sent us elsewhere.
    pub redirected_from: Option<String>,
}

/// Resolves paths against the route table and publishes the result.
#[derive(Debug)]
pub struct PortalRouter {
    options: MountOptions,
    current: watch::Sender<RouteChange>,
}

impl PortalRouter {
    /// A router positioned at the portal root, not yet guarded.
    pub fn new(options: MountOptions) -> Self {
        let initial = RouteChange {
            route: Route::Home,
            path: "/".to_string(),
            host_path: options.to_host_path("/"),
            view: RouteView::Waiting,
            replace: true,
            redirected_from: None,
        };
        let (current, _) = watch::channel(initial);
        Self { options, current }
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn subscribe(&self) -> watch::Receiver<RouteChange> {
        self.current.subscribe()
    }

    pub fn current(&self) -> RouteChange {
        self.current.borrow().clone()
    }

    /// Resolve a portal-relative path without publishing it.
    ///
    /// A guard redirect lands on a public route, so one hop is enough.
    pub fn resolve<S: AuthStatus + ?Sized>(&self, path: &str, status: &S) -> RouteChange {
        let path = normalize(path);
        let route = Route::from_path(&path);

        let decision = route
            .guard()
            .map_or(GuardDecision::Render, |guard| guard.evaluate(status));

        match decision {
            GuardDecision::Render => self.change(route, path, RouteView::Render, false, None),
            GuardDecision::Waiting => self.change(route, path, RouteView::Waiting, false, None),
            GuardDecision::Redirect { to, replace } => {
                tracing::debug!(from = %path, to, "guard redirect");
                self.change(Route::from_path(to), to.to_string(), RouteView::Render, replace, Some(path))
            }
        }
    }

    fn change(
        &self,
        route: Route,
        path: String,
        view: RouteView,
        replace: bool,
        redirected_from: Option<String>,
    ) -> RouteChange {
        RouteChange {
            route,
            host_path: self.options.to_host_path(&path),
            path,
            view,
            replace,
            redirected_from,
        }
    }

    /// Resolve `path` and publish the result.
    pub fn navigate<S: AuthStatus + ?Sized>(&self, path: &str, status: &S) -> RouteChange {
        let change = self.resolve(path, status);
        tracing::debug!(path = %change.path, route = ?change.route, view = ?change.view, "route change");
        self.current.send_replace(change.clone());
        change
    }

    /// Apply an intent produced by the auth subsystem.
    ///
    /// External intents leave the portal and are not routed.
    pub fn apply_intent<S: AuthStatus + ?Sized>(
        &self,
        intent: &NavigationIntent,
        status: &S,
    ) -> Option<RouteChange> {
        match intent {
            NavigationIntent::External(_) => None,
            NavigationIntent::Internal { path, replace } => {
                let mut change = self.resolve(path, status);
                change.replace |= *replace;
                self.current.send_replace(change.clone());
                Some(change)
            }
        }
    }

    /// Follow host navigation requests and session changes until the host
    /// channel closes.
    ///
    /// Every session change re-runs the guards for the current location, so
    /// a view waiting on auth settles once loading finishes and a logout
    /// moves a protected view to the login screen.
    pub async fn run(&self, mut host: mpsc::Receiver<HostNavigation>, session: &AuthSession) {
        let mut auth = session.subscribe();
        tracing::info!(base_path = %self.options.base_path, "portal router started");

        loop {
            tokio::select! {
                request = host.recv() => match request {
                    Some(request) => {
                        self.navigate(&request.path, session);
                    }
                    None => break,
                },
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = auth.borrow_and_update().clone();
                    let path = self.current.borrow().path.clone();
                    let change = self.resolve(&path, &snapshot);
                    self.current.send_if_modified(|current| {
                        if *current == change {
                            return false;
                        }
                        *current = change;
                        true
                    });
                }
            }
        }

        tracing::info!("portal router stopped");
    }
}

// ---------------------------------------------------------------------------
// Mount handle
// ---------------------------------------------------------------------------

/// A running portal inside a host.
#[derive(Debug)]
pub struct MountHandle {
    host: mpsc::Sender<HostNavigation>,
    routes: watch::Receiver<RouteChange>,
    task: JoinHandle<()>,
}

impl MountHandle {
    /// Sender the host uses to request navigation.
    pub fn host_sender(&self) -> mpsc::Sender<HostNavigation> {
        self.host.clone()
    }

    /// Route changes for the host to reflect in its own URL bar.
    pub fn routes(&self) -> watch::Receiver<RouteChange> {
        self.routes.clone()
    }

    /// Stop routing.
    pub fn unmount(self) {
        self.task.abort();
    }
}

/// Start the portal under `options`, routing to `initial_path`.
///
/// Must be called from within a tokio runtime.
pub fn mount(options: MountOptions, session: Arc<AuthSession>, initial_path: &str) -> MountHandle {
    let router = Arc::new(PortalRouter::new(options));
    router.navigate(initial_path, session.as_ref());

    let (host, rx) = mpsc::channel(HOST_CHANNEL_CAPACITY);
    let routes = router.subscribe();
    let task = tokio::spawn(async move {
        router.run(rx, session.as_ref()).await;
    });

    MountHandle { host, routes, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionSnapshot;
    use crate::exchange::demo_identity;
    use crate::types::User;

    fn status(user: Option<User>, loading: bool) -> SessionSnapshot {
        SessionSnapshot {
            user,
            loading,
            ..SessionSnapshot::default()
        }
    }

    fn employee() -> SessionSnapshot {
        status(Some(demo_identity("demo")), false)
    }

    fn contractor() -> SessionSnapshot {
        let mut user = demo_identity("demo");
        user.roles = vec!["contractor".to_string()];
        status(Some(user), false)
    }

    #[test]
    fn route_table() {
        assert_eq!(Route::from_path("/login"), Route::Login);
        assert_eq!(Route::from_path("/unauthorized"), Route::Unauthorized);
        assert_eq!(Route::from_path("/auth-callback?code=x&state=y"), Route::AuthCallback);
        assert_eq!(Route::from_path("/"), Route::Home);
        assert_eq!(Route::from_path(""), Route::Home);
        assert_eq!(Route::from_path("/leave/"), Route::Leave);
        assert_eq!(Route::from_path("/nope"), Route::NotFound);
    }

    #[test]
    fn guards_per_route() {
        assert!(Route::Login.is_public());
        assert!(Route::AuthCallback.is_public());
        assert!(Route::NotFound.is_public());
        assert_eq!(Route::Home.guard(), Some(RouteGuard::authenticated()));
        assert_eq!(Route::Leave.guard(), Some(RouteGuard::with_role("employee")));
    }

    #[test]
    fn mount_options_paths() {
        let standalone = MountOptions::standalone();
        assert_eq!(standalone.strip_base("/leave"), Some("/leave".to_string()));
        assert_eq!(standalone.to_host_path("/leave"), "/leave");

        let mounted = MountOptions::mounted("/hr/portal/");
        assert_eq!(mounted.base_path, "/hr/portal");
        assert_eq!(mounted.strip_base("/hr/portal"), Some("/".to_string()));
        assert_eq!(mounted.strip_base("/hr/portal/leave"), Some("/leave".to_string()));
        assert_eq!(mounted.strip_base("/hr/portalx"), None);
        assert_eq!(mounted.strip_base("/other"), None);
        assert_eq!(mounted.to_host_path("/"), "/hr/portal");
        assert_eq!(mounted.to_host_path("/login"), "/hr/portal/login");
    }

    #[test]
    fn unauthenticated_protected_route_redirects() {
        let router = PortalRouter::new(MountOptions::standalone());
        let change = router.resolve("/leave", &status(None, false));
        assert_eq!(change.route, Route::Login);
        assert_eq!(change.path, "/login");
        assert!(change.replace);
        assert_eq!(change.redirected_from.as_deref(), Some("/leave"));
    }

    #[test]
    fn missing_role_redirects_to_unauthorized() {
        let router = PortalRouter::new(MountOptions::standalone());
        let change = router.resolve("/leave", &contractor());
        assert_eq!(change.route, Route::Unauthorized);

        let home = router.resolve("/", &contractor());
        assert_eq!(home.route, Route::Home);
        assert_eq!(home.view, RouteView::Render);
    }

    #[test]
    fn loading_waits_in_place() {
        let router = PortalRouter::new(MountOptions::standalone());
        let change = router.resolve("/leave", &status(None, true));
        assert_eq!(change.route, Route::Leave);
        assert_eq!(change.view, RouteView::Waiting);
    }

    #[test]
    fn mounted_redirects_are_prefixed() {
        let router = PortalRouter::new(MountOptions::mounted("/hr"));
        let change = router.resolve("/leave", &status(None, false));
        assert_eq!(change.host_path, "/hr/login");
    }

    #[test]
    fn apply_internal_intent() {
        let router = PortalRouter::new(MountOptions::standalone());
        let change = router
            .apply_intent(&NavigationIntent::replace("/leave"), &employee())
            .unwrap();
        assert_eq!(change.route, Route::Leave);
        assert!(change.replace);
        assert_eq!(router.current(), change);
    }

    #[test]
    fn external_intent_not_routed() {
        let router = PortalRouter::new(MountOptions::standalone());
        let url = url::Url::parse("https://id.example.com/authorize").unwrap();
        assert!(router.apply_intent(&NavigationIntent::External(url), &employee()).is_none());
    }
}
