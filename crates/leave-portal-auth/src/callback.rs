//! Handling of the identity server's redirect back to the portal.
//!
//! [`complete_callback`] interprets the redirect's query string and drives
//! the auth session to a [`CallbackOutcome`]. [`CallbackServer`] is a
//! one-shot local HTTP listener for running the flow outside a browser
//! shell: it waits on the redirect URI's host and port, hands back the raw
//! query, and serves a result page.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use url::Url;

use crate::context::AuthSession;
use crate::error::{AuthError, Result};
use crate::guard::LOGIN_PATH;
use crate::messages::{self, PROVIDER_ERROR_FALLBACK};
use crate::navigation::{NavigationIntent, Navigator};

/// How long a failure is shown before returning to the login screen.
pub const FAILURE_REDIRECT_DELAY: Duration = Duration::from_millis(3000);

/// Where a successful callback lands.
pub const SUCCESS_PATH: &str = "/";

/// How long an accepted connection may stay silent before it is dropped.
/// Browsers open speculative connections that never carry a request.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// The `code` and `state` from a successful authorization redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams").finish_non_exhaustive()
    }
}

impl CallbackParams {
    /// Parse a redirect query string (with or without the leading `?`).
    ///
    /// # Errors
    ///
    /// - [`AuthError::ProviderError`] if the identity server reported an
    ///   `error`; the description is its `error_description`, or
    ///   "Authentication failed" when absent.
    /// - [`AuthError::MissingCallbackParams`] if `code` or `state` is
    ///   missing or empty.
    pub fn from_query(query: &str) -> Result<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => error = Some(value),
                "error_description" => error_description = Some(value),
                _ => {}
            }
        }

        if let Some(error) = error {
            tracing::warn!(error = %error, "identity server returned an error");
            return Err(AuthError::ProviderError {
                description: error_description
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| PROVIDER_ERROR_FALLBACK.to_string()),
            });
        }

        match (code, state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => {
                Ok(Self { code, state })
            }
            _ => Err(AuthError::MissingCallbackParams),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What the callback screen shows and where it goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Success {
        redirect_to: &'static str,
    },
    Failure {
        message: String,
        redirect_to: &'static str,
        after: Duration,
    },
}

impl CallbackOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            redirect_to: LOGIN_PATH,
            after: FAILURE_REDIRECT_DELAY,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Perform the follow-up navigation, waiting out the failure delay.
    pub async fn follow(&self, navigator: &dyn Navigator) {
        match self {
            Self::Success { redirect_to } => navigator.navigate(NavigationIntent::to(*redirect_to)),
            Self::Failure {
                redirect_to, after, ..
            } => {
                tokio::time::sleep(*after).await;
                navigator.navigate(NavigationIntent::to(*redirect_to));
            }
        }
    }
}

/// Interpret a redirect query and complete the login through `session`.
pub async fn complete_callback(session: &AuthSession, query: &str) -> CallbackOutcome {
    let params = match CallbackParams::from_query(query) {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(kind = ?e.kind(), "callback rejected before exchange");
            return CallbackOutcome::failure(messages::user_message(&e));
        }
    };

    if session
        .handle_auth_callback(&params.code, &params.state)
        .await
    {
        CallbackOutcome::Success {
            redirect_to: SUCCESS_PATH,
        }
    } else {
        CallbackOutcome::failure(messages::CALLBACK_FAILED)
    }
}

// ---------------------------------------------------------------------------
// Local callback listener
// ---------------------------------------------------------------------------

const PAGE_STYLE: &str = r#"<style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #f9fafb;
            color: #333;
        }
        .card { text-align: center; max-width: 28rem; padding: 2rem; }
        h2.error { color: #ef4444; }
        p { color: #6b7280; }
    </style>"#;

/// One-shot HTTP listener for the authorization redirect.
#[derive(Debug)]
pub struct CallbackServer {
    listener: TcpListener,
    path: String,
}

/// A received redirect whose browser connection is still open.
#[derive(Debug)]
pub struct PendingCallback {
    /// Raw query string, without the leading `?`.
    pub query: String,
    stream: TcpStream,
}

impl CallbackServer {
    /// Listen on the host and port of `redirect_uri`, accepting requests for
    /// its path.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidConfig`] if the URI has no host.
    /// - [`AuthError::Io`] if the listener cannot bind.
    pub async fn bind(redirect_uri: &Url) -> Result<Self> {
        let host = redirect_uri
            .host_str()
            .ok_or_else(|| AuthError::InvalidConfig {
                reason: format!("redirect_uri has no host: {redirect_uri}"),
            })?;
        let port = redirect_uri.port_or_known_default().unwrap_or(80);
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let listener = TcpListener::bind((host, port)).await?;
        tracing::info!(addr = %listener.local_addr()?, path = redirect_uri.path(), "callback server listening");

        Ok(Self {
            listener,
            path: redirect_uri.path().to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for a request on the callback path.
    ///
    /// Requests for other paths (favicons, probes) get a 404 and the wait
    /// continues.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CallbackTimeout`] if nothing arrives within `timeout`.
    /// - [`AuthError::Io`] on socket failures.
    pub async fn wait_for_callback(&self, timeout: Duration) -> Result<PendingCallback> {
        match tokio::time::timeout(timeout, self.accept_matching()).await {
            Ok(inner) => inner,
            Err(_) => Err(AuthError::CallbackTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Connections are read concurrently, so an idle socket cannot hold up
    /// the one carrying the redirect.
    async fn accept_matching(&self) -> Result<PendingCallback> {
        let mut reads = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    tracing::debug!(peer = %peer, "accepted callback connection");
                    reads.spawn(read_request(stream));
                }
                Some(joined) = reads.join_next() => {
                    let Ok(Some((mut stream, request))) = joined else {
                        continue;
                    };

                    match parse_request_target(&request) {
                        Some((path, query)) if path == self.path => {
                            return Ok(PendingCallback {
                                query: query.to_string(),
                                stream,
                            });
                        }
                        other => {
                            tracing::debug!(path = ?other.map(|(p, _)| p), "ignoring non-callback request");
                            if let Err(e) = write_response(&mut stream, "404 Not Found", "Not Found").await {
                                tracing::debug!(error = %e, "failed to answer non-callback request");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Wait for the redirect, complete the login, and answer the browser.
    pub async fn serve_once(&self, session: &AuthSession, timeout: Duration) -> Result<CallbackOutcome> {
        let pending = self.wait_for_callback(timeout).await?;
        let outcome = complete_callback(session, &pending.query).await;
        pending.respond(&outcome).await?;
        Ok(outcome)
    }
}

impl PendingCallback {
    /// Serve the result page and close the connection.
    pub async fn respond(mut self, outcome: &CallbackOutcome) -> Result<()> {
        let body = render_page(outcome);
        write_response(&mut self.stream, "200 OK", &body).await?;
        tracing::info!(success = outcome.is_success(), "callback answered");
        Ok(())
    }
}

/// Read the request head from `stream`. Silent or closed connections yield
/// `None`.
async fn read_request(mut stream: TcpStream) -> Option<(TcpStream, String)> {
    // Redirect requests are small GETs.
    let mut buf = [0u8; 8192];
    match tokio::time::timeout(REQUEST_READ_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            let request = String::from_utf8_lossy(&buf[..n]).into_owned();
            Some((stream, request))
        }
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "failed to read callback connection");
            None
        }
        Err(_) => {
            tracing::debug!("dropping silent callback connection");
            None
        }
    }
}

/// Split `GET /path?query HTTP/1.1` into path and query.
fn parse_request_target(request: &str) -> Option<(&str, &str)> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    Some(target.split_once('?').unwrap_or((target, "")))
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn render_page(outcome: &CallbackOutcome) -> String {
    let (title, content) = match outcome {
        CallbackOutcome::Success { .. } => (
            "Authentication Complete",
            "<h2>Authentication Complete</h2>\n        <p>You can close this tab and return to the portal.</p>".to_string(),
        ),
        CallbackOutcome::Failure { message, .. } => (
            "Authentication Error",
            format!(
                "<h2 class=\"error\">Authentication Error</h2>\n        <p>{}</p>\n        <p>Redirecting to login page...</p>",
                escape_html(message)
            ),
        ),
    };

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n    <title>{title}</title>\n    {PAGE_STYLE}\n</head>\n<body>\n    <div class=\"card\">\n        {content}\n    </div>\n</body>\n</html>"
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::AuthClient;
    use crate::config::AuthConfig;
    use crate::error::AuthErrorKind;
    use crate::exchange::DemoTokenExchanger;
    use crate::navigation::ChannelNavigator;
    use crate::profile::StaticProfileClient;
    use crate::session::SessionStore;

    fn session() -> AuthSession {
        let client = AuthClient::new(
            AuthConfig::default(),
            SessionStore::in_memory(),
            Arc::new(DemoTokenExchanger),
        )
        .unwrap();
        let (navigator, _rx) = ChannelNavigator::channel();
        AuthSession::new(
            Arc::new(client),
            Arc::new(StaticProfileClient::default()),
            Arc::new(navigator),
        )
    }

    fn pending_state(session: &AuthSession) -> String {
        let url = session.client().build_authorization_url().unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn params_standard() {
        let params = CallbackParams::from_query("code=abc123&state=xyz789").unwrap();
        assert_eq!(params.code, "abc123");
        assert_eq!(params.state, "xyz789");
    }

    #[test]
    fn params_leading_question_mark_and_extras() {
        let params =
            CallbackParams::from_query("?code=c1&state=s1&session_state=abc").unwrap();
        assert_eq!(params.code, "c1");
        assert_eq!(params.state, "s1");
    }

    #[test]
    fn params_percent_decoded() {
        let params = CallbackParams::from_query("code=abc%20def&state=123%2B456").unwrap();
        assert_eq!(params.code, "abc def");
        assert_eq!(params.state, "123+456");
    }

    #[test]
    fn provider_error_uses_description_verbatim() {
        let err = CallbackParams::from_query(
            "error=access_denied&error_description=User+cancelled+login",
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::ProviderError { ref description } if description == "User cancelled login"));
    }

    #[test]
    fn provider_error_without_description() {
        let err = CallbackParams::from_query("error=access_denied&state=xyz").unwrap_err();
        assert!(matches!(err, AuthError::ProviderError { ref description } if description == "Authentication failed"));
    }

    #[test]
    fn error_takes_precedence_over_code() {
        let err = CallbackParams::from_query("code=abc&state=xyz&error=server_error").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::ProviderError);
    }

    #[test]
    fn missing_or_empty_params() {
        for query in ["", "code=abc", "state=xyz", "code=&state=xyz", "code=abc&state="] {
            let err = CallbackParams::from_query(query).unwrap_err();
            assert!(matches!(err, AuthError::MissingCallbackParams), "query {query:?}");
        }
    }

    #[test]
    fn debug_hides_values() {
        let params = CallbackParams::from_query("code=secret-code&state=secret-state").unwrap();
        let debug = format!("{params:?}");
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn complete_callback_success() {
        let session = session();
        let state = pending_state(&session);

        let outcome = complete_callback(&session, &format!("code=abc&state={state}")).await;
        assert_eq!(outcome, CallbackOutcome::Success { redirect_to: "/" });
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn complete_callback_missing_params() {
        let session = session();
        let outcome = complete_callback(&session, "code=abc").await;
        assert_eq!(
            outcome,
            CallbackOutcome::Failure {
                message: "Missing required authentication parameters".to_string(),
                redirect_to: "/login",
                after: Duration::from_millis(3000),
            }
        );
    }

    #[tokio::test]
    async fn complete_callback_provider_error() {
        let session = session();
        let outcome =
            complete_callback(&session, "error=access_denied&error_description=Nope").await;
        match outcome {
            CallbackOutcome::Failure { message, .. } => assert_eq!(message, "Nope"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_callback_bad_state() {
        let session = session();
        pending_state(&session);
        let outcome = complete_callback(&session, "code=abc&state=forged").await;
        match outcome {
            CallbackOutcome::Failure { message, .. } => {
                assert_eq!(message, "Failed to complete authentication");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn failure_follow_waits_before_redirect() {
        let (navigator, mut rx) = ChannelNavigator::channel();
        let outcome = CallbackOutcome::Failure {
            message: "boom".to_string(),
            redirect_to: LOGIN_PATH,
            after: Duration::from_millis(30),
        };

        let started = tokio::time::Instant::now();
        outcome.follow(&navigator).await;

        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(rx.recv().await.unwrap(), NavigationIntent::to("/login"));
    }

    #[tokio::test]
    async fn success_follow_goes_home() {
        let (navigator, mut rx) = ChannelNavigator::channel();
        CallbackOutcome::Success { redirect_to: "/" }
            .follow(&navigator)
            .await;
        assert_eq!(rx.recv().await.unwrap(), NavigationIntent::to("/"));
    }

    #[test]
    fn request_target_parsing() {
        assert_eq!(
            parse_request_target("GET /auth-callback?code=a&state=b HTTP/1.1\r\n\r\n"),
            Some(("/auth-callback", "code=a&state=b"))
        );
        assert_eq!(
            parse_request_target("GET /favicon.ico HTTP/1.1\r\n\r\n"),
            Some(("/favicon.ico", ""))
        );
        assert_eq!(parse_request_target(""), None);
        assert_eq!(parse_request_target("NOTHTTP"), None);
    }

    #[test]
    fn failure_page_escapes_message() {
        let page = render_page(&CallbackOutcome::failure("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
        assert!(page.contains("Redirecting to login page..."));
    }

    async fn send_request(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn server_receives_callback_and_answers() {
        let uri = Url::parse("http://127.0.0.1:0/auth-callback").unwrap();
        let server = CallbackServer::bind(&uri).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let not_found = send_request(addr, "/favicon.ico").await;
            assert!(not_found.contains("404 Not Found"));
            send_request(addr, "/auth-callback?code=c42&state=s99").await
        });

        let pending = server
            .wait_for_callback(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(pending.query, "code=c42&state=s99");
        pending
            .respond(&CallbackOutcome::Success { redirect_to: "/" })
            .await
            .unwrap();

        let response = client.await.unwrap();
        assert!(response.contains("200 OK"));
        assert!(response.contains("Authentication Complete"));
    }

    #[tokio::test]
    async fn idle_connection_does_not_block_callback() {
        let uri = Url::parse("http://127.0.0.1:0/auth-callback").unwrap();
        let server = CallbackServer::bind(&uri).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            // Opened first and never written to, like a browser preconnect.
            let idle = TcpStream::connect(addr).await.unwrap();
            let closed = TcpStream::connect(addr).await.unwrap();
            drop(closed);
            tokio::time::sleep(Duration::from_millis(50)).await;
            let response = send_request(addr, "/auth-callback?code=c&state=s").await;
            drop(idle);
            response
        });

        let pending = server
            .wait_for_callback(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(pending.query, "code=c&state=s");
        pending
            .respond(&CallbackOutcome::Success { redirect_to: "/" })
            .await
            .unwrap();

        assert!(client.await.unwrap().contains("200 OK"));
    }

    #[tokio::test]
    async fn server_times_out() {
        let uri = Url::parse("http://127.0.0.1:0/auth-callback").unwrap();
        let server = CallbackServer::bind(&uri).await.unwrap();

        let result = server.wait_for_callback(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AuthError::CallbackTimeout { timeout_secs: 0 })));
    }

    #[tokio::test]
    async fn serve_once_completes_login() {
        let session = session();
        let state = pending_state(&session);
        let uri = Url::parse("http://127.0.0.1:0/auth-callback").unwrap();
        let server = CallbackServer::bind(&uri).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            send_request(addr, &format!("/auth-callback?code=abc&state={state}")).await
        });

        let outcome = server
            .serve_once(&session, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert!(session.is_authenticated());
        assert!(client.await.unwrap().contains("Authentication Complete"));
    }
}
