//! CLI entry point for the Leave Portal.
//!
//! This binary provides the `leave-portal` command: sign in through the
//! identity server, inspect or clear the stored session, and check how the
//! portal's router treats a path.

mod cli;
mod helpers;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use leave_portal_auth::{
    AuthSession, CallbackOutcome, CallbackServer, LoginCredentials, MountOptions, Notice,
    PortalRouter, RouteView,
};
use tokio::sync::broadcast;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{build_session, init_tracing, load_config, open_session_store};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let callback_timeout = Duration::from_secs(config.callback_timeout_secs);
    let store = open_session_store(&cli.data_dir)?;
    let session = build_session(config, store)?;

    match cli.command {
        Commands::Login => cmd_login(&session, callback_timeout).await,
        Commands::DemoLogin { username, password } => {
            cmd_demo_login(&session, LoginCredentials::new(username, password)).await
        }
        Commands::AuthorizeUrl => cmd_authorize_url(&session),
        Commands::Whoami => cmd_whoami(&session).await,
        Commands::Logout => cmd_logout(&session).await,
        Commands::Check { path, base_path } => cmd_check(&session, &path, &base_path),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: login
// ---------------------------------------------------------------------------

async fn cmd_login(session: &AuthSession, timeout: Duration) -> Result<()> {
    let redirect = session.client().endpoints().redirect.clone();
    let server = CallbackServer::bind(&redirect)
        .await
        .with_context(|| format!("failed to listen on {redirect}"))?;

    let url = session
        .client()
        .build_authorization_url()
        .context("failed to start login")?;
    println!();
    println!("  Open this URL in your browser to sign in:");
    println!();
    println!("  {url}");
    println!();
    info!(timeout_secs = timeout.as_secs(), "waiting for the identity server redirect");

    let outcome = server
        .serve_once(session, timeout)
        .await
        .context("login did not complete")?;

    match outcome {
        CallbackOutcome::Success { .. } => {
            print_user(session);
            Ok(())
        }
        CallbackOutcome::Failure { message, .. } => bail!("{message}"),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: demo-login
// ---------------------------------------------------------------------------

async fn cmd_demo_login(session: &AuthSession, credentials: LoginCredentials) -> Result<()> {
    let mut notices = session.notices();

    let ok = session.login(&credentials).await;
    print_notices(&mut notices);

    if ok {
        print_user(session);
        return Ok(());
    }

    if session.client().session().has_pending_request() {
        println!("  Direct sign-in was not accepted. Run `leave-portal login` to sign in");
        println!("  through the identity server instead.");
        return Ok(());
    }
    bail!("sign-in failed")
}

// ---------------------------------------------------------------------------
// Subcommand: authorize-url
// ---------------------------------------------------------------------------

fn cmd_authorize_url(session: &AuthSession) -> Result<()> {
    let url = session
        .client()
        .build_authorization_url()
        .context("failed to build authorization URL")?;
    println!("{url}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: whoami
// ---------------------------------------------------------------------------

async fn cmd_whoami(session: &AuthSession) -> Result<()> {
    if !session.is_authenticated() {
        println!("  Not signed in.");
        return Ok(());
    }

    let mut notices = session.notices();
    session.initialize().await;
    print_user(session);
    print_notices(&mut notices);

    let contexts = session.user_contexts();
    if contexts.is_empty() {
        println!("  No organizational contexts.");
        return Ok(());
    }

    let active = session.active_context();
    println!("  Contexts:");
    for ctx in &contexts {
        let marker = if active.as_ref() == Some(ctx) { "*" } else { " " };
        println!("   {marker} {} - {}", ctx.organizational_unit, ctx.role);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: logout
// ---------------------------------------------------------------------------

async fn cmd_logout(session: &AuthSession) -> Result<()> {
    let was_signed_in = session.is_authenticated();
    let url = session.client().build_logout_url();
    session.logout().await;

    if was_signed_in {
        println!("  Signed out locally.");
    } else {
        println!("  No local session.");
    }
    println!("  End the identity server session at:");
    println!("  {url}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

fn cmd_check(session: &AuthSession, host_path: &str, base_path: &str) -> Result<()> {
    let options = MountOptions::mounted(base_path);
    let Some(path) = options.strip_base(host_path) else {
        bail!("{host_path} is outside the portal mounted at {}", options.base_path);
    };

    let router = PortalRouter::new(options);
    let change = router.resolve(&path, session);

    let view = match change.view {
        RouteView::Waiting => "waiting",
        RouteView::Render => "render",
    };
    let output = serde_json::json!({
        "requested": host_path,
        "route": format!("{:?}", change.route),
        "path": change.path,
        "host_path": change.host_path,
        "view": view,
        "replace": change.replace,
        "redirected_from": change.redirected_from,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_user(session: &AuthSession) {
    let Some(user) = session.user() else {
        return;
    };
    println!();
    println!("  Signed in as {} ({})", user.username, user.email);
    println!("  Roles: {}", user.roles.join(", "));
    println!();
}

fn print_notices(notices: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice {
            Notice::Success(msg) => println!("  {msg}"),
            Notice::Error(msg) => eprintln!("  Error: {msg}"),
        }
    }
}
