// ============================
// lightnovel-backend/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod password;
pub mod rate_limit;
pub mod session;
pub mod token;
mod service;
mod service_impl;

pub use password::{CredentialVerifier, PasswordPolicy, ScryptVerifier, MIN_PASSWORD_LENGTH};
pub use rate_limit::AuthRateLimiter;
pub use service::AuthService;
pub use service_impl::DefaultAuth;
pub use session::{Session, SessionManager, SessionPolicy};
pub use token::{AccountId, SessionToken};
