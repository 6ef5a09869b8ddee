//! CLI argument definitions for the Leave Portal.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Leave Portal -- sign in to the leave booking portal from a terminal.
#[derive(Parser)]
#[command(
    name = "leave-portal",
    version,
    about = "Leave Portal -- delegated sign-in and session tools",
    long_about = "Runs the Leave Portal's OAuth 2.0 + PKCE login against the configured \
                  identity server, keeps the session on disk, and answers routing questions."
)]
pub struct Cli {
    /// Path to a TOML configuration file (defaults to ./leave-portal.toml if present).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the session database.
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in through the identity server and wait for the redirect.
    Login,

    /// Sign in with the configured demo credentials.
    DemoLogin {
        #[arg(long, short)]
        username: String,

        #[arg(long, short)]
        password: String,
    },

    /// Print a fresh authorization URL (starts a new login attempt).
    AuthorizeUrl,

    /// Show the signed-in user and their organizational contexts.
    Whoami,

    /// Clear the local session and print the identity server's logout URL.
    Logout,

    /// Resolve a path through the portal's routes and guards.
    Check {
        /// Path in the host's URL space, e.g. `/leave`.
        path: String,

        /// Prefix the portal is mounted under.
        #[arg(long, default_value = "/")]
        base_path: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_check_with_base_path() {
        let cli = Cli::try_parse_from(["leave-portal", "check", "/hr/leave", "--base-path", "/hr"])
            .unwrap();
        match cli.command {
            Commands::Check { path, base_path } => {
                assert_eq!(path, "/hr/leave");
                assert_eq!(base_path, "/hr");
            }
            _ => panic!("expected check"),
        }
        assert_eq!(cli.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "leave-portal",
            "whoami",
            "--config",
            "portal.toml",
            "--data-dir",
            "/tmp/portal",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Whoami));
        assert_eq!(cli.config, Some(PathBuf::from("portal.toml")));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/portal"));
    }

    #[test]
    fn demo_login_requires_both_fields() {
        assert!(Cli::try_parse_from(["leave-portal", "demo-login", "-u", "demo"]).is_err());
        assert!(
            Cli::try_parse_from(["leave-portal", "demo-login", "-u", "demo", "-p", "password"])
                .is_ok()
        );
    }
}
