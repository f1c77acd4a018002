//! TOTP secret generation and code verification (RFC 6238 / RFC 4226).
//!
//! Secrets are 160-bit, base32-encoded (RFC 4648 alphabet). Verification
//! accepts the current 30-second step plus one step of drift in either
//! direction to absorb clock skew between the server and authenticator apps.

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// Enrollment material returned once to the user at setup time.
#[derive(Debug)]
pub struct Enrollment {
    pub secret: String,
    pub otpauth_uri: String,
}

/// Stateless TOTP operations parameterized by the issuer shown in
/// authenticator apps.
#[derive(Clone, Debug)]
pub struct TotpEngine {
    issuer: String,
}

impl TotpEngine {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generate a fresh 160-bit secret, base32-encoded.
    ///
    /// # Errors
    /// Returns an error if the generated secret cannot be encoded.
    pub fn generate_secret(&self) -> Result<String> {
        let secret = Secret::generate_secret();
        let bytes = secret
            .to_bytes()
            .map_err(|e| anyhow!("secret generation error: {e}"))?;
        let totp = self.build(bytes, "pending")?;
        Ok(totp.get_secret_base32())
    }

    /// Build the enrollment URI for a stored secret.
    ///
    /// # Errors
    /// Returns an error if the secret does not decode as base32.
    pub fn enrollment(&self, secret_base32: &str, account_label: &str) -> Result<Enrollment> {
        let totp = self.from_base32(secret_base32, account_label)?;
        Ok(Enrollment {
            secret: totp.get_secret_base32(),
            otpauth_uri: totp.get_url(),
        })
    }

    /// Verify `code` against `secret_base32` at the current time.
    #[must_use]
    pub fn verify(&self, secret_base32: &str, code: &str) -> bool {
        if !valid_code_format(code) {
            return false;
        }
        self.from_base32(secret_base32, "verify")
            .ok()
            .and_then(|totp| totp.check_current(code).ok())
            .unwrap_or(false)
    }

    /// Verify `code` at an explicit unix timestamp; ±1 step is accepted.
    #[must_use]
    pub fn verify_at(&self, secret_base32: &str, code: &str, unix_seconds: u64) -> bool {
        if !valid_code_format(code) {
            return false;
        }
        self.from_base32(secret_base32, "verify")
            .map(|totp| totp.check(code, unix_seconds))
            .unwrap_or(false)
    }

    /// Generate the code for an explicit timestamp.
    ///
    /// # Errors
    /// Returns an error if the secret does not decode as base32.
    pub fn generate_at(&self, secret_base32: &str, unix_seconds: u64) -> Result<String> {
        let totp = self.from_base32(secret_base32, "generate")?;
        Ok(totp.generate(unix_seconds))
    }

    fn from_base32(&self, secret_base32: &str, label: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("invalid base32 secret: {e}"))?;
        self.build(bytes, label)
    }

    fn build(&self, secret_bytes: Vec<u8>, label: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }
}

/// Codes must be exactly six ASCII digits before any cryptographic check.
#[must_use]
pub fn valid_code_format(code: &str) -> bool {
    code.len() == DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Step-aligned so the drift window boundaries are exact.
    const T0: u64 = 1_500_000_000;

    fn engine() -> TotpEngine {
        TotpEngine::new("Kuraci")
    }

    #[test]
    fn generated_secret_is_base32() {
        let secret = engine().generate_secret().unwrap();
        assert!(!secret.is_empty());
        assert!(
            secret
                .bytes()
                .all(|b| b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(&b))
        );
    }

    #[test]
    fn enrollment_uri_carries_parameters() {
        let eng = engine();
        let secret = eng.generate_secret().unwrap();
        let enrollment = eng.enrollment(&secret, "alice@clinic.test").unwrap();
        assert!(enrollment.otpauth_uri.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_uri.contains("issuer=Kuraci"));
        assert!(enrollment.otpauth_uri.contains("digits=6"));
        assert!(enrollment.otpauth_uri.contains("period=30"));
        assert!(enrollment.otpauth_uri.contains("algorithm=SHA1"));
        assert!(
            enrollment
                .otpauth_uri
                .contains(&format!("secret={}", enrollment.secret))
        );
    }

    #[test]
    fn code_verifies_within_adjacent_steps() {
        let eng = engine();
        let secret = eng.generate_secret().unwrap();
        let code = eng.generate_at(&secret, T0).unwrap();

        // Same step and both adjacent steps.
        assert!(eng.verify_at(&secret, &code, T0));
        assert!(eng.verify_at(&secret, &code, T0 + 29));
        assert!(eng.verify_at(&secret, &code, T0 + 59));
        assert!(eng.verify_at(&secret, &code, T0.saturating_sub(1)));
    }

    #[test]
    fn code_fails_outside_drift_window() {
        let eng = engine();
        let secret = eng.generate_secret().unwrap();
        let code = eng.generate_at(&secret, T0).unwrap();

        // Two or more steps away.
        assert!(!eng.verify_at(&secret, &code, T0 + 90));
        assert!(!eng.verify_at(&secret, &code, T0 + 3600));
    }

    #[test]
    fn malformed_codes_rejected_before_crypto() {
        let eng = engine();
        let secret = eng.generate_secret().unwrap();
        assert!(!eng.verify_at(&secret, "12345", T0));
        assert!(!eng.verify_at(&secret, "1234567", T0));
        assert!(!eng.verify_at(&secret, "12a456", T0));
        assert!(!eng.verify_at(&secret, "", T0));
    }

    #[test]
    fn wrong_secret_never_verifies() {
        let eng = engine();
        let secret = eng.generate_secret().unwrap();
        let other = eng.generate_secret().unwrap();
        let code = eng.generate_at(&secret, T0).unwrap();
        assert!(!eng.verify_at(&other, &code, T0));
    }

    #[test]
    fn valid_code_format_is_strict() {
        assert!(valid_code_format("000000"));
        assert!(valid_code_format("123456"));
        assert!(!valid_code_format("123 456"));
        assert!(!valid_code_format("abcdef"));
    }
}
