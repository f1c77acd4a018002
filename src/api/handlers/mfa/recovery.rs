//! Recovery code generation and verification.
//!
//! Recovery codes are a one-time bypass for when the authenticator app is
//! unavailable. Plaintext codes exist only in the response that creates them;
//! storage holds Argon2id hashes, optionally strengthened with a server-side
//! pepper. The alphabet excludes confusable characters (0/O, 1/I/L).

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{RngCore, rngs::OsRng};

pub(crate) const RECOVERY_CODE_COUNT: usize = 8;
pub(crate) const RECOVERY_CODE_LEN: usize = 10;
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated recovery-code batch (plaintext + hashes).
#[derive(Debug)]
pub(crate) struct RecoveryCodeBatch {
    pub(crate) codes: Vec<String>,
    pub(crate) code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate a full batch; the pepper is mixed in when configured.
    pub(crate) fn generate(pepper: Option<&[u8]>) -> Result<Self> {
        let mut rng = OsRng;
        Self::generate_with_rng(&mut rng, pepper)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, pepper: Option<&[u8]>) -> Result<Self> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code(rng);
            let hash = hash_recovery_code(&code, pepper)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Normalize a recovery code for verification.
///
/// # Errors
/// Returns an error when the cleaned-up input is not a well-formed code.
pub(crate) fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }
    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow!("invalid recovery code characters"));
    }
    Ok(normalized)
}

/// Verify a recovery code against a stored hash.
///
/// # Errors
/// Returns an error for malformed codes or unparseable stored hashes.
pub(crate) fn verify_recovery_code(
    code: &str,
    stored_hash: &str,
    pepper: Option<&[u8]>,
) -> Result<bool> {
    let normalized = normalize_recovery_code(code)?;
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid recovery code hash"))?;
    Ok(argon2_instance(pepper)?
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

fn argon2_instance(pepper: Option<&[u8]>) -> Result<Argon2<'_>> {
    match pepper {
        Some(pepper) => Argon2::new_with_secret(
            pepper,
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2::Params::default(),
        )
        .map_err(|_| anyhow!("failed to initialize Argon2id")),
        None => Ok(Argon2::default()),
    }
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    rng.fill_bytes(&mut raw);
    raw.iter()
        .map(|byte| {
            let idx = usize::from(*byte) % RECOVERY_CODE_ALPHABET.len();
            RECOVERY_CODE_ALPHABET[idx] as char
        })
        .collect()
}

fn hash_recovery_code(code: &str, pepper: Option<&[u8]>) -> Result<String> {
    let normalized = normalize_recovery_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2_instance(pepper)?
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash recovery code"))?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn batch_has_eight_codes_of_ten_chars() {
        let batch = RecoveryCodeBatch::generate(None).unwrap();
        assert_eq!(batch.codes.len(), RECOVERY_CODE_COUNT);
        assert_eq!(batch.code_hashes.len(), RECOVERY_CODE_COUNT);
        for code in &batch.codes {
            assert_eq!(code.len(), RECOVERY_CODE_LEN);
            assert!(
                code.bytes()
                    .all(|b| super::RECOVERY_CODE_ALPHABET.contains(&b))
            );
        }
    }

    #[test]
    fn normalize_accepts_case_and_separators() {
        let normalized = normalize_recovery_code("abcd-efgh 23").unwrap();
        assert_eq!(normalized, "ABCDEFGH23");
    }

    #[test]
    fn normalize_rejects_confusables_and_bad_length() {
        assert!(normalize_recovery_code("ABCDEFGH0O").is_err()); // 0 and O excluded
        assert!(normalize_recovery_code("SHORT").is_err());
        assert!(normalize_recovery_code("WAYTOOLONGCODE").is_err());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let batch = RecoveryCodeBatch::generate(None).unwrap();
        let code = &batch.codes[0];
        let hash = &batch.code_hashes[0];
        assert!(verify_recovery_code(code, hash, None).unwrap());
        assert!(!verify_recovery_code("ABCDEFGH23", hash, None).unwrap());
    }

    #[test]
    fn pepper_changes_verification_outcome() {
        let pepper = b"pepper".as_slice();
        let batch = RecoveryCodeBatch::generate(Some(pepper)).unwrap();
        let code = &batch.codes[0];
        let hash = &batch.code_hashes[0];
        assert!(verify_recovery_code(code, hash, Some(pepper)).unwrap());
        // Without the pepper the same hash must not verify.
        assert!(!verify_recovery_code(code, hash, None).unwrap());
    }

    #[test]
    fn lowercase_input_verifies() {
        let batch = RecoveryCodeBatch::generate(None).unwrap();
        let code = batch.codes[0].to_lowercase();
        let hash = &batch.code_hashes[0];
        assert!(verify_recovery_code(&code, hash, None).unwrap());
    }
}
