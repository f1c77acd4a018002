//! Argon2id password hashing and verification.
//!
//! Verification against a missing account runs the same Argon2id work over a
//! fixed dummy hash so response timing does not reveal whether the account
//! exists.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

pub(crate) const MIN_PASSWORD_CHARS: usize = 8;

// Hash of an unguessable sentinel; verified when no account matches so the
// credential check costs the same either way.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| {
    hash_password("kuraci-dummy-credential-timing-equalizer")
        .unwrap_or_else(|_| String::from("$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAA$AAAA"))
});

/// Hash a password with Argon2id and a fresh salt.
///
/// # Errors
/// Returns an error if hashing fails.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored hash.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Verify a password against an optional hash; `None` burns the same work on
/// the dummy hash and always fails.
pub(crate) fn verify_or_dummy(password: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            false
        }
    }
}

/// Minimal strength gate applied on password change and reset.
pub(crate) fn acceptable_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_CHARS
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("same-password").unwrap();
        let second = hash_password("same-password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn dummy_verification_always_fails() {
        assert!(!verify_or_dummy("anything", None));
        let hash = hash_password("real").unwrap();
        assert!(verify_or_dummy("real", Some(&hash)));
        assert!(!verify_or_dummy("fake", Some(&hash)));
    }

    #[test]
    fn malformed_hash_fails_closed() {
        assert!(!verify_password("pw", "not-a-phc-string"));
    }

    #[test]
    fn acceptable_password_length_gate() {
        assert!(acceptable_password("12345678"));
        assert!(!acceptable_password("1234567"));
    }
}
