use crate::{api, api::handlers::auth::AuthConfig, tokens::TokenService};
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

// HMAC-SHA256 keys shorter than the hash output weaken the signature.
const MIN_TOKEN_KEY_BYTES: usize = 32;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub issuer: String,
    pub token_key: SecretString,
    pub token_kid: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub challenge_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub recovery_pepper: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let key = decode_token_key(args.token_key.expose_secret())?;
    let token_service = TokenService::new(key, args.token_kid);

    let auth_config = AuthConfig::new()
        .with_issuer(args.issuer)
        .with_access_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_ttl_seconds)
        .with_challenge_ttl_seconds(args.challenge_ttl_seconds)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds);

    let recovery_pepper: Option<Arc<[u8]>> = args
        .recovery_pepper
        .as_ref()
        .map(|pepper| Arc::from(pepper.expose_secret().as_bytes()));

    api::new(
        args.port,
        args.dsn,
        auth_config,
        token_service,
        recovery_pepper,
    )
    .await
}

fn decode_token_key(encoded: &str) -> Result<Vec<u8>> {
    let key = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded.trim()))
        .context("token key is not valid base64")?;
    if key.len() < MIN_TOKEN_KEY_BYTES {
        return Err(anyhow!(
            "token key must be at least {MIN_TOKEN_KEY_BYTES} bytes, got {}",
            key.len()
        ));
    }
    Ok(key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn decode_token_key_accepts_both_alphabets() {
        let raw = [7u8; 32];
        let standard = base64::engine::general_purpose::STANDARD.encode(raw);
        let url_safe = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);
        assert_eq!(decode_token_key(&standard).unwrap(), raw.to_vec());
        assert_eq!(decode_token_key(&url_safe).unwrap(), raw.to_vec());
    }

    #[test]
    fn decode_token_key_rejects_short_or_invalid() {
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(decode_token_key(&short).is_err());
        assert!(decode_token_key("!!!not-base64!!!").is_err());
    }
}
