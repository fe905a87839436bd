// ============================
// lightnovel-backend/src/lib.rs
// ============================
//! Account, session and authentication core of the light-novel backend.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod storage;
pub mod validation;

use std::sync::Arc;

use crate::auth::{
    AuthRateLimiter, AuthService, CredentialVerifier, DefaultAuth, PasswordPolicy,
    ScryptVerifier, SessionManager,
};
use crate::config::Settings;
use crate::middleware::RateLimiter;
use crate::storage::Storage;

pub use router::create_router;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState<S> {
    /// Authentication service
    pub auth: Arc<dyn AuthService>,
    /// Session manager
    pub sessions: Arc<SessionManager<S>>,
    /// Loaded settings
    pub settings: Arc<Settings>,
    /// Per-client request limiter
    pub rate_limiter: Arc<RateLimiter>,
    /// Login lockout, shared with the auth service
    pub auth_rate_limiter: AuthRateLimiter,
}

impl<S: Storage + Clone + 'static> AppState<S> {
    /// Create the application state with an scrypt verifier built from `settings`
    pub fn new(storage: S, settings: Settings) -> anyhow::Result<Self> {
        let verifier = ScryptVerifier::new(settings.password.scrypt_log_n)?;
        Ok(Self::with_verifier(storage, settings, Arc::new(verifier)))
    }

    /// Create the application state around an existing verifier
    pub fn with_verifier(
        storage: S,
        settings: Settings,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            storage.clone(),
            settings.session_policy(),
        ));
        let auth_rate_limiter = AuthRateLimiter::new(
            settings.auth_lockout.max_attempts,
            std::time::Duration::from_secs(settings.auth_lockout.lockout_secs),
        );
        let password_policy = PasswordPolicy {
            min_length: settings.password.min_length,
            max_length: settings.password.max_length,
        };
        let auth = Arc::new(DefaultAuth::new(
            storage,
            Arc::clone(&sessions),
            verifier,
            password_policy,
            auth_rate_limiter.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            std::time::Duration::from_secs(settings.rate_limit.window_secs),
            settings.rate_limit.max_requests,
        ));

        Self {
            auth,
            sessions,
            settings: Arc::new(settings),
            rate_limiter,
            auth_rate_limiter,
        }
    }
}
