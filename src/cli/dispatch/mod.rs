//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        issuer: auth_opts.issuer,
        token_key: auth_opts.token_key,
        token_kid: auth_opts.token_kid,
        access_ttl_seconds: auth_opts.access_ttl_seconds,
        refresh_ttl_seconds: auth_opts.refresh_ttl_seconds,
        challenge_ttl_seconds: auth_opts.challenge_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        recovery_pepper: auth_opts.recovery_pepper,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_key_required() {
        temp_env::with_vars(
            [
                ("KURACI_TOKEN_KEY", None::<&str>),
                (
                    "KURACI_DSN",
                    Some("postgres://user@localhost:5432/kuraci"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let result = command.try_get_matches_from(vec!["kuraci"]);
                // clap enforces the signing key before dispatch runs.
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn server_args_built_from_matches() {
        temp_env::with_vars([("KURACI_TOKEN_KEY", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "kuraci",
                "--dsn",
                "postgres://user@localhost:5432/kuraci",
                "--token-key",
                "c2VjcmV0LXNpZ25pbmcta2V5LXRoaXJ0eS10d28tYnl0ZXM",
                "--token-kid",
                "k9",
                "--access-ttl-seconds",
                "600",
            ]);
            let action = handler(&matches).expect("handler");
            let Action::Server(args) = action;
            assert_eq!(args.port, 8080);
            assert_eq!(args.token_kid, "k9");
            assert_eq!(args.access_ttl_seconds, 600);
            assert!(args.recovery_pepper.is_none());
        });
    }
}
