//! # Kuraci (Clinical Records Security Core)
//!
//! `kuraci` is the security and access-control core of a clinical-records
//! platform. It handles credential authentication with optional TOTP
//! multi-factor challenge, signed bearer-token session management, per-bucket
//! rate limiting, and break-the-glass emergency access to protected patient
//! records.
//!
//! ## Authentication
//!
//! Passwords are Argon2id-hashed; a failed login looks identical whether or
//! not the account exists. Accounts with MFA enabled complete login in two
//! steps bridged by a signed, stateless challenge token, so no server-side
//! state lives between the steps.
//!
//! ## Tokens & Sessions
//!
//! Access tokens are short-lived and validated offline; refresh tokens are
//! long-lived, single-use, and rotated atomically against the session store.
//! Changing or resetting a password revokes standing sessions.
//!
//! ## Rate Limiting & Incidents
//!
//! Every request passes a fixed-window rate-limit gate keyed per IP and, for
//! credential endpoints, per principal. Denials respond `429` with retry
//! guidance and are recorded as security incidents best-effort.
//!
//! ## Break-the-Glass (BTG)
//!
//! Emergency access grants are time-boxed (1–120 minutes), require a reason,
//! and end only by expiry. Denials are explicit and auditable, never folded
//! into a generic not-found.

pub mod api;
pub mod btg;
pub mod cli;
pub mod incident;
pub mod ratelimit;
pub mod tokens;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
