// ============================
// lightnovel-backend/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::auth::password::{HASH_INPUT_LIMIT, MIN_PASSWORD_LENGTH};
use crate::auth::session::SessionPolicy;

/// Environment variable prefix, nested keys use `__` (`LIGHTNOVEL_SESSION__DURATION_SECS`)
pub const ENV_PREFIX: &str = "LIGHTNOVEL_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Longest accepted session lifetime (10 years)
pub const MAX_SESSION_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub session: SessionSettings,
    pub password: PasswordSettings,
    pub rate_limit: RateLimitSettings,
    pub auth_lockout: AuthLockoutSettings,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// `text` or `json`
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Which persistence backend to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Root directory of the flat-file backend
    pub path: PathBuf,
}

/// Session lifetime policy, all values in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub duration_secs: u64,
    /// Reads extend the session once less than this much validity is left
    pub renew_threshold_secs: u64,
    pub sweep_interval_secs: u64,
    pub op_timeout_secs: u64,
    pub sweep_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub min_length: usize,
    pub max_length: usize,
    /// scrypt CPU/memory cost exponent
    pub scrypt_log_n: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthLockoutSettings {
    pub max_attempts: u32,
    pub lockout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            session: SessionSettings::default(),
            password: PasswordSettings::default(),
            rate_limit: RateLimitSettings::default(),
            auth_lockout: AuthLockoutSettings::default(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("data"),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_secs: 60 * 60 * 24 * 30, // 30 days
            renew_threshold_secs: 60 * 60 * 24 * 7,
            sweep_interval_secs: 60 * 60,
            op_timeout_secs: 60,
            sweep_timeout_secs: 60 * 10,
        }
    }
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            max_length: HASH_INPUT_LIMIT,
            scrypt_log_n: 15,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
        }
    }
}

impl Default for AuthLockoutSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 5 * 60,
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` in the working directory and the environment
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load settings with `path` as the TOML layer; a missing file is not an error
    pub fn load_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            anyhow::bail!("unknown log level `{}`", self.log_level);
        }
        if self.log_format != "text" && self.log_format != "json" {
            anyhow::bail!("log_format must be `text` or `json`");
        }

        let session = &self.session;
        if session.duration_secs == 0
            || session.sweep_interval_secs == 0
            || session.op_timeout_secs == 0
            || session.sweep_timeout_secs == 0
        {
            anyhow::bail!("session durations and timeouts must be non-zero");
        }
        if session.renew_threshold_secs >= session.duration_secs {
            anyhow::bail!("session renew threshold must be shorter than the session duration");
        }
        // Expiry timestamps are computed as now + duration
        if session.duration_secs > MAX_SESSION_DURATION_SECS {
            anyhow::bail!("session duration must not exceed {MAX_SESSION_DURATION_SECS} seconds");
        }

        let password = &self.password;
        if password.min_length < MIN_PASSWORD_LENGTH {
            anyhow::bail!("minimum password length must be at least {MIN_PASSWORD_LENGTH}");
        }
        if password.max_length > HASH_INPUT_LIMIT || password.max_length < password.min_length {
            anyhow::bail!(
                "maximum password length must be between the minimum and {HASH_INPUT_LIMIT}"
            );
        }
        if password.scrypt_log_n == 0 || password.scrypt_log_n >= 64 {
            anyhow::bail!("scrypt_log_n must be between 1 and 63");
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate limit window and request budget must be non-zero");
        }
        if self.auth_lockout.max_attempts == 0 {
            anyhow::bail!("auth lockout needs at least one attempt");
        }

        Ok(())
    }

    /// Socket address the server binds to
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }

    /// Session lifetime policy derived from the `session` section
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            duration: chrono::Duration::seconds(self.session.duration_secs as i64),
            renew_threshold: chrono::Duration::seconds(self.session.renew_threshold_secs as i64),
            op_timeout: Duration::from_secs(self.session.op_timeout_secs),
            sweep_timeout: Duration::from_secs(self.session.sweep_timeout_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_secs)
    }
}
