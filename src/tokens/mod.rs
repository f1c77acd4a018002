//! Signed bearer tokens for access, refresh, and MFA challenge flows.
//!
//! Tokens are compact JWS strings (`header.claims.signature`, base64url
//! without padding) signed with HMAC-SHA256. The signing key is process-wide
//! and loaded once at startup; the header carries a `kid` so a future key
//! rotation can be introduced without changing the token format.
//!
//! Access tokens are validated offline (signature + expiry only). Refresh
//! tokens additionally carry the session id and are checked against the
//! session store by the caller. MFA challenge tokens bind the account id
//! between the two steps of a login so no server-side state is needed.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

pub const TOKEN_VERSION: u8 = 1;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 5 * 60;

type HmacSha256 = Hmac<Sha256>;

/// Kind marker embedded in every token; validation is kind-specific so an
/// access token can never be replayed as a refresh token or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    MfaChallenge,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::MfaChallenge => "mfa_challenge",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
    kid: String,
}

impl TokenHeader {
    fn hs256(kid: impl Into<String>) -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub v: u8,
    pub sub: Uuid,
    /// Session id; present on access and refresh tokens, absent on
    /// challenge tokens (no session exists yet at that point).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenKind,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token version")]
    InvalidVersion,
    #[error("wrong token kind: expected {expected:?}, found {found:?}")]
    WrongKind {
        expected: TokenKind,
        found: TokenKind,
    },
    #[error("refresh token missing session id")]
    MissingSessionId,
    #[error("signing key rejected")]
    Key,
}

/// Current unix time in seconds, used as the `iat`/`now` input everywhere.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Issues and validates the three token kinds with a single symmetric key.
#[derive(Clone)]
pub struct TokenService {
    key: Vec<u8>,
    kid: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    challenge_ttl_seconds: i64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("key", &"***")
            .field("kid", &self.kid)
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("challenge_ttl_seconds", &self.challenge_ttl_seconds)
            .finish()
    }
}

impl TokenService {
    #[must_use]
    pub fn new(key: Vec<u8>, kid: impl Into<String>) -> Self {
        Self {
            key,
            kid: kid.into(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    /// Issue a short-lived access token for `sub` within session `sid`.
    ///
    /// # Errors
    /// Returns an error if claims encoding or signing fails.
    pub fn issue_access(
        &self,
        sub: Uuid,
        sid: Uuid,
        now_unix_seconds: i64,
    ) -> Result<String, Error> {
        self.sign(&Claims {
            v: TOKEN_VERSION,
            sub,
            sid: Some(sid),
            iat: now_unix_seconds,
            exp: now_unix_seconds + self.access_ttl_seconds,
            typ: TokenKind::Access,
        })
    }

    /// Issue a refresh token bound to the session `sid`.
    ///
    /// # Errors
    /// Returns an error if claims encoding or signing fails.
    pub fn issue_refresh(
        &self,
        sub: Uuid,
        sid: Uuid,
        now_unix_seconds: i64,
    ) -> Result<String, Error> {
        self.sign(&Claims {
            v: TOKEN_VERSION,
            sub,
            sid: Some(sid),
            iat: now_unix_seconds,
            exp: now_unix_seconds + self.refresh_ttl_seconds,
            typ: TokenKind::Refresh,
        })
    }

    /// Issue a stateless MFA challenge token bound to `sub`.
    ///
    /// # Errors
    /// Returns an error if claims encoding or signing fails.
    pub fn issue_challenge(&self, sub: Uuid, now_unix_seconds: i64) -> Result<String, Error> {
        self.sign(&Claims {
            v: TOKEN_VERSION,
            sub,
            sid: None,
            iat: now_unix_seconds,
            exp: now_unix_seconds + self.challenge_ttl_seconds,
            typ: TokenKind::MfaChallenge,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, Error> {
        let header = TokenHeader::hs256(self.kid.clone());
        let header_b64 = b64e_json(&header)?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| Error::Key)?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify signature, version, kind, and expiry, returning the claims.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the token is malformed or contains invalid base64/json,
    /// - the `kid` or algorithm is not the one this service signs with,
    /// - the signature is invalid,
    /// - the claims fail validation (`v`, `typ`, `exp`).
    pub fn validate(
        &self,
        token: &str,
        expected: TokenKind,
        now_unix_seconds: i64,
    ) -> Result<Claims, Error> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
        if parts.next().is_some() {
            return Err(Error::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }
        if header.kid != self.kid {
            return Err(Error::UnknownKid(header.kid));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| Error::Key)?;
        mac.update(signing_input.as_bytes());
        // Mac::verify_slice compares in constant time.
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: Claims = b64d_json(claims_b64)?;
        if claims.v != TOKEN_VERSION {
            return Err(Error::InvalidVersion);
        }
        if claims.typ != expected {
            return Err(Error::WrongKind {
                expected,
                found: claims.typ,
            });
        }
        if claims.exp <= now_unix_seconds {
            return Err(Error::Expired);
        }
        if claims.sid.is_none() && expected != TokenKind::MfaChallenge {
            return Err(Error::MissingSessionId);
        }

        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn service() -> TokenService {
        TokenService::new(b"0123456789abcdef0123456789abcdef".to_vec(), "k1")
    }

    #[test]
    fn access_token_round_trips() {
        let svc = service();
        let sub = Uuid::new_v4();
        let sid = Uuid::new_v4();
        let token = svc.issue_access(sub, sid, NOW).unwrap();
        let claims = svc.validate(&token, TokenKind::Access, NOW + 1).unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.typ, TokenKind::Access);
        assert_eq!(claims.exp, NOW + 15 * 60);
        assert_eq!(claims.sid, Some(sid));
    }

    #[test]
    fn refresh_token_carries_session_id() {
        let svc = service();
        let sub = Uuid::new_v4();
        let sid = Uuid::new_v4();
        let token = svc.issue_refresh(sub, sid, NOW).unwrap();
        let claims = svc.validate(&token, TokenKind::Refresh, NOW + 1).unwrap();
        assert_eq!(claims.sid, Some(sid));
    }

    #[test]
    fn expired_token_rejected() {
        let svc = service().with_access_ttl_seconds(60);
        let token = svc.issue_access(Uuid::new_v4(), Uuid::new_v4(), NOW).unwrap();
        assert!(svc.validate(&token, TokenKind::Access, NOW + 59).is_ok());
        let result = svc.validate(&token, TokenKind::Access, NOW + 60);
        assert!(matches!(result, Err(Error::Expired)));
    }

    #[test]
    fn kind_confusion_rejected() {
        let svc = service();
        let sub = Uuid::new_v4();
        let access = svc.issue_access(sub, Uuid::new_v4(), NOW).unwrap();
        let result = svc.validate(&access, TokenKind::Refresh, NOW);
        assert!(matches!(result, Err(Error::WrongKind { .. })));

        let challenge = svc.issue_challenge(sub, NOW).unwrap();
        let result = svc.validate(&challenge, TokenKind::Access, NOW);
        assert!(matches!(result, Err(Error::WrongKind { .. })));
    }

    #[test]
    fn challenge_token_has_no_session() {
        let svc = service();
        let sub = Uuid::new_v4();
        let token = svc.issue_challenge(sub, NOW).unwrap();
        let claims = svc
            .validate(&token, TokenKind::MfaChallenge, NOW + 1)
            .unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.sid, None);
        assert_eq!(claims.exp, NOW + 5 * 60);
    }

    #[test]
    fn tampered_payload_rejected() {
        let svc = service();
        let token = svc.issue_access(Uuid::new_v4(), Uuid::new_v4(), NOW).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = b64e_json(&Claims {
            v: TOKEN_VERSION,
            sub: Uuid::new_v4(),
            sid: None,
            iat: NOW,
            exp: NOW + 999_999,
            typ: TokenKind::Access,
        })
        .unwrap();
        parts[1] = &forged;
        let tampered = parts.join(".");
        let result = svc.validate(&tampered, TokenKind::Access, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
    }

    #[test]
    fn wrong_key_rejected() {
        let svc = service();
        let other = TokenService::new(b"ffffffffffffffffffffffffffffffff".to_vec(), "k1");
        let token = svc.issue_access(Uuid::new_v4(), Uuid::new_v4(), NOW).unwrap();
        let result = other.validate(&token, TokenKind::Access, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
    }

    #[test]
    fn unknown_kid_rejected() {
        let svc = service();
        let rotated = TokenService::new(b"0123456789abcdef0123456789abcdef".to_vec(), "k2");
        let token = svc.issue_access(Uuid::new_v4(), Uuid::new_v4(), NOW).unwrap();
        let result = rotated.validate(&token, TokenKind::Access, NOW);
        assert!(matches!(result, Err(Error::UnknownKid(kid)) if kid == "k1"));
    }

    #[test]
    fn garbage_rejected() {
        let svc = service();
        assert!(matches!(
            svc.validate("not-a-token", TokenKind::Access, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            svc.validate("a.b.c.d", TokenKind::Access, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            svc.validate("!!.!!.!!", TokenKind::Access, NOW),
            Err(Error::Base64)
        ));
    }
}
