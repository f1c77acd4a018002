//! Fixed-window rate limiting keyed by `(bucket, key, window)`.
//!
//! A bucket is a named policy (`limit` requests per `window_secs`) applied
//! independently per key, e.g. per client IP or per login identifier. The
//! window index is derived purely from wall-clock time, so counters reset at
//! aligned boundaries rather than on a rolling interval.
//!
//! The limiter is an explicitly-owned value injected into the request gate;
//! tests construct isolated instances. Counters live in process memory, so a
//! deployment spreading load over several instances under-limits accordingly
//! and would swap this for a shared counter store behind the same call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bucket names consumed by the request gate.
pub const BUCKET_GLOBAL_IP: &str = "global-ip";
pub const BUCKET_LOGIN_IP: &str = "login-ip";
pub const BUCKET_LOGIN_PRINCIPAL: &str = "login-principal";
pub const BUCKET_RESET_REQUEST_IP: &str = "reset-request-ip";
pub const BUCKET_RESET_REQUEST_PRINCIPAL: &str = "reset-request-principal";
pub const BUCKET_RESET_CONFIRM_IP: &str = "reset-confirm-ip";

/// Static policy for one bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketSpec {
    pub limit: u64,
    pub window_secs: u64,
}

/// Outcome of a consume attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_epoch_seconds: u64,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct CounterKey {
    bucket: String,
    key: String,
    window: u64,
}

/// In-process fixed-window limiter with atomic per-key check-and-increment.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    buckets: HashMap<String, BucketSpec>,
    counters: Mutex<HashMap<CounterKey, u64>>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a bucket policy. Unregistered buckets always allow.
    #[must_use]
    pub fn with_bucket(mut self, name: &str, limit: u64, window_secs: u64) -> Self {
        self.buckets
            .insert(name.to_string(), BucketSpec { limit, window_secs });
        self
    }

    /// Production bucket set: login and reset flows plus the global gate.
    #[must_use]
    pub fn with_default_buckets(self) -> Self {
        self.with_bucket(BUCKET_GLOBAL_IP, 100, 60)
            .with_bucket(BUCKET_LOGIN_IP, 20, 60)
            .with_bucket(BUCKET_LOGIN_PRINCIPAL, 5, 60)
            .with_bucket(BUCKET_RESET_REQUEST_IP, 5, 900)
            .with_bucket(BUCKET_RESET_REQUEST_PRINCIPAL, 3, 900)
            .with_bucket(BUCKET_RESET_CONFIRM_IP, 10, 600)
    }

    #[must_use]
    pub fn spec(&self, bucket: &str) -> Option<BucketSpec> {
        self.buckets.get(bucket).copied()
    }

    /// Consume one unit from `(bucket, key)` at the current time.
    #[must_use]
    pub fn try_consume(&self, bucket: &str, key: &str) -> Decision {
        self.try_consume_at(bucket, key, unix_now_secs())
    }

    /// Consume one unit at an explicit timestamp.
    ///
    /// The check and increment happen under a single lock, so two concurrent
    /// requests for the same key can never both be admitted past the limit.
    /// At or above the limit the counter is not incremented.
    #[must_use]
    pub fn try_consume_at(&self, bucket: &str, key: &str, now_secs: u64) -> Decision {
        let Some(spec) = self.buckets.get(bucket) else {
            // Fail-open: buckets not explicitly configured are unlimited.
            return Decision {
                allowed: true,
                remaining: u64::MAX,
                reset_epoch_seconds: now_secs,
            };
        };

        let window = now_secs / spec.window_secs;
        let reset_epoch_seconds = (window + 1) * spec.window_secs;
        let counter_key = CounterKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
            window,
        };

        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            // A poisoned lock means a panic mid-increment; the map is still
            // structurally sound, so keep limiting rather than failing open.
            Err(poisoned) => poisoned.into_inner(),
        };

        // Entries from past windows are dead weight; drop them while we hold
        // the lock so memory stays bounded by the active window population.
        let buckets = &self.buckets;
        counters.retain(|k, _| {
            buckets
                .get(&k.bucket)
                .is_some_and(|s| (k.window + 1) * s.window_secs > now_secs)
        });

        let count = counters.entry(counter_key).or_insert(0);
        if *count >= spec.limit {
            return Decision {
                allowed: false,
                remaining: 0,
                reset_epoch_seconds,
            };
        }
        *count += 1;
        Decision {
            allowed: true,
            remaining: spec.limit - *count,
            reset_epoch_seconds,
        }
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
