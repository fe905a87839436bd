// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Lockout of clients that keep failing to log in.

use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics::AUTH_LOCKOUT;

/// Failure records older than this are forgotten by `cleanup`
const FAILURE_MEMORY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct AttemptEntry {
    failed_attempts: u32,
    last_failure: Instant,
    /// Set while the client is locked out
    lockout_expiry: Option<Instant>,
}

/// Per-client counter of failed logins
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    attempts: Arc<DashMap<String, AttemptEntry>>,
    max_attempts: u32,
    lockout_duration: Duration,
}

impl AuthRateLimiter {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
        }
    }

    /// Record a failed login for `client`
    pub fn record_failed_attempt(&self, client: &str) {
        let now = Instant::now();
        let mut entry = self
            .attempts
            .entry(client.to_string())
            .or_insert_with(|| AttemptEntry {
                failed_attempts: 0,
                last_failure: now,
                lockout_expiry: None,
            });

        // A served lockout starts a fresh count
        if entry.lockout_expiry.is_some_and(|expiry| now >= expiry) {
            entry.failed_attempts = 0;
            entry.lockout_expiry = None;
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts && entry.lockout_expiry.is_none() {
            entry.lockout_expiry = Some(now + self.lockout_duration);
            counter!(AUTH_LOCKOUT).increment(1);
            tracing::warn!(
                client,
                lockout_secs = self.lockout_duration.as_secs(),
                "client locked out after repeated login failures"
            );
        }
    }

    /// Forget failures after a successful login
    pub fn record_success(&self, client: &str) {
        self.attempts.remove(client);
    }

    /// Whether `client` may attempt to log in right now
    pub fn check_rate_limit(&self, client: &str) -> bool {
        match self.attempts.get(client) {
            Some(entry) => !entry
                .lockout_expiry
                .is_some_and(|expiry| Instant::now() < expiry),
            None => true,
        }
    }

    /// Drop served lockouts and stale failure records
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.attempts.retain(|_, entry| match entry.lockout_expiry {
            Some(expiry) => now < expiry,
            None => now.duration_since(entry.last_failure) < FAILURE_MEMORY,
        });
    }
}
