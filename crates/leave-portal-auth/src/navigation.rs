//! Navigation intents.
//!
//! Operations that would move the browser (start login, log out, show the
//! login screen) return a [`NavigationIntent`] instead of acting. Performing
//! it is a separate step owned by a [`Navigator`], so tests can observe the
//! computed destination and hosts can decide how to carry it out.

use tokio::sync::mpsc;
use url::Url;

/// Where the user agent should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationIntent {
    /// Full navigation away from the portal (identity server pages).
    /// Control does not come back to the current page.
    External(Url),

    /// Route change inside the portal, relative to its base path.
    Internal {
        path: String,
        /// Replace the current history entry instead of pushing.
        replace: bool,
    },
}

impl NavigationIntent {
    /// Push an internal route.
    pub fn to(path: impl Into<String>) -> Self {
        Self::Internal {
            path: path.into(),
            replace: false,
        }
    }

    /// Replace the current entry with an internal route.
    pub fn replace(path: impl Into<String>) -> Self {
        Self::Internal {
            path: path.into(),
            replace: true,
        }
    }

    /// Whether this intent leaves the portal.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

/// Performs navigation intents.
pub trait Navigator: Send + Sync {
    fn navigate(&self, intent: NavigationIntent);
}

/// Logs the destination for a human to open. Used by the CLI, where "the
/// browser" is whatever the operator pastes the URL into.
#[derive(Debug, Clone, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, intent: NavigationIntent) {
        match intent {
            NavigationIntent::External(url) => {
                tracing::info!(url = %url, "open this URL in your browser");
            }
            NavigationIntent::Internal { path, replace } => {
                tracing::info!(path = %path, replace, "route change");
            }
        }
    }
}

/// Forwards intents to a host over a channel.
///
/// This is the outbound half of the embedding contract: a host shell owns
/// the receiver and decides how to apply each intent.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<NavigationIntent>,
}

impl ChannelNavigator {
    /// Create a navigator and the receiver the host drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NavigationIntent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, intent: NavigationIntent) {
        if self.tx.send(intent).is_err() {
            tracing::warn!("navigation receiver dropped, intent discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        assert_eq!(
            NavigationIntent::to("/"),
            NavigationIntent::Internal {
                path: "/".to_string(),
                replace: false
            }
        );
        assert_eq!(
            NavigationIntent::replace("/login"),
            NavigationIntent::Internal {
                path: "/login".to_string(),
                replace: true
            }
        );
    }

    #[test]
    fn external_detection() {
        let url = Url::parse("https://id.example.com/logout").unwrap();
        assert!(NavigationIntent::External(url).is_external());
        assert!(!NavigationIntent::to("/").is_external());
    }

    #[test]
    fn channel_navigator_forwards_in_order() {
        let (nav, mut rx) = ChannelNavigator::channel();
        nav.navigate(NavigationIntent::to("/a"));
        nav.navigate(NavigationIntent::to("/b"));

        assert_eq!(rx.try_recv().unwrap(), NavigationIntent::to("/a"));
        assert_eq!(rx.try_recv().unwrap(), NavigationIntent::to("/b"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_navigator_survives_dropped_receiver() {
        let (nav, rx) = ChannelNavigator::channel();
        drop(rx);
        nav.navigate(NavigationIntent::to("/"));
    }
}
