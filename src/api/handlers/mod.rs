//! API handlers for the security and access-control core.
//!
//! `auth` carries the login/refresh/password flows, `mfa` the TOTP
//! enrollment and recovery codes, `btg` the emergency-access grants, and
//! `health` the operational endpoint exempt from rate limiting.

pub mod auth;
pub mod btg;
pub mod health;
pub mod mfa;
