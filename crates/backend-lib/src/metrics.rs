// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_DELETED: &str = "session.deleted";
pub const SESSION_RENEWED: &str = "session.renewed";
pub const SESSION_EXTENDED: &str = "session.extended";
pub const SESSION_EXPIRED: &str = "session.expired";
pub const ACCOUNT_CREATED: &str = "account.created";
pub const ACCOUNT_DELETED: &str = "account.deleted";
pub const AUTH_LOGIN_SUCCESS: &str = "auth.login.success";
pub const AUTH_LOGIN_FAILED: &str = "auth.login.failed";
pub const AUTH_LOCKOUT: &str = "auth.lockout";
pub const STORAGE_TIMEOUT: &str = "storage.timeout";
pub const RATE_LIMITED: &str = "http.rate_limited";
