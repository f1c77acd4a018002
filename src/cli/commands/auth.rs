//! Security-related CLI arguments: token signing, TTLs, and MFA settings.

use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_KEY: &str = "token-key";
pub const ARG_TOKEN_KID: &str = "token-kid";
pub const ARG_AUTH_ISSUER: &str = "auth-issuer";
pub const ARG_RECOVERY_PEPPER: &str = "recovery-pepper";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_ttl_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_KEY)
                .long(ARG_TOKEN_KEY)
                .help("Base64-encoded HMAC signing key for bearer tokens (32+ bytes)")
                .env("KURACI_TOKEN_KEY")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_KID)
                .long(ARG_TOKEN_KID)
                .help("Key id embedded in token headers")
                .env("KURACI_TOKEN_KID")
                .default_value("k1"),
        )
        .arg(
            Arg::new(ARG_AUTH_ISSUER)
                .long(ARG_AUTH_ISSUER)
                .help("Issuer shown in authenticator apps and enrollment URIs")
                .env("KURACI_AUTH_ISSUER")
                .default_value("Kuraci"),
        )
        .arg(
            Arg::new(ARG_RECOVERY_PEPPER)
                .long(ARG_RECOVERY_PEPPER)
                .help("Server-side pepper mixed into recovery code hashes")
                .env("KURACI_RECOVERY_PEPPER"),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("KURACI_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh token and session TTL in seconds")
                .env("KURACI_REFRESH_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("challenge-ttl-seconds")
                .long("challenge-ttl-seconds")
                .help("MFA challenge token TTL in seconds")
                .env("KURACI_CHALLENGE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("KURACI_RESET_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
}

/// Parsed security options.
#[derive(Debug)]
pub struct Options {
    pub issuer: String,
    pub token_key: SecretString,
    pub token_kid: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub challenge_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub recovery_pepper: Option<SecretString>,
}

impl Options {
    /// Extract options from validated matches.
    ///
    /// # Errors
    /// Returns an error when a required argument is absent.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let token_key = matches
            .get_one::<String>(ARG_TOKEN_KEY)
            .cloned()
            .context("missing required argument: --token-key")?;
        Ok(Self {
            issuer: matches
                .get_one::<String>(ARG_AUTH_ISSUER)
                .cloned()
                .unwrap_or_else(|| "Kuraci".to_string()),
            token_key: SecretString::from(token_key),
            token_kid: matches
                .get_one::<String>(ARG_TOKEN_KID)
                .cloned()
                .unwrap_or_else(|| "k1".to_string()),
            access_ttl_seconds: matches
                .get_one::<i64>("access-ttl-seconds")
                .copied()
                .unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>("refresh-ttl-seconds")
                .copied()
                .unwrap_or(2_592_000),
            challenge_ttl_seconds: matches
                .get_one::<i64>("challenge-ttl-seconds")
                .copied()
                .unwrap_or(300),
            reset_token_ttl_seconds: matches
                .get_one::<i64>("reset-token-ttl-seconds")
                .copied()
                .unwrap_or(1800),
            recovery_pepper: matches
                .get_one::<String>(ARG_RECOVERY_PEPPER)
                .cloned()
                .map(SecretString::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn options_parse_defaults_and_pepper() {
        temp_env::with_vars(
            [
                ("KURACI_TOKEN_KEY", None::<&str>),
                ("KURACI_RECOVERY_PEPPER", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "kuraci",
                    "--dsn",
                    "postgres://localhost/kuraci",
                    "--token-key",
                    "a2V5LW1hdGVyaWFsLWZvci10ZXN0aW5nLXB1cnBvc2Vz",
                    "--recovery-pepper",
                    "ward-pepper",
                ]);
                let options = Options::parse(&matches).expect("options");
                assert_eq!(options.issuer, "Kuraci");
                assert_eq!(options.token_kid, "k1");
                assert_eq!(options.access_ttl_seconds, 900);
                assert_eq!(
                    options
                        .recovery_pepper
                        .as_ref()
                        .map(|p| p.expose_secret().to_string()),
                    Some("ward-pepper".to_string())
                );
            },
        );
    }
}
