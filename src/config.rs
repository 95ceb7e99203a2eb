//! Runtime configuration parsed from environment variables.
//!
//! SYSTEM CONTEXT
//! ==============
//! The binary loads `.env` (if present) before calling [`Config::from_env`];
//! library callers can build the typed structs directly.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SESSION_PATH: &str = "taskboard-session.json";
pub const DEFAULT_AUTH_STATE_PATH: &str = "taskboard-auth.json";
pub const DEFAULT_PROFILE_WAIT_ATTEMPTS: u32 = 5;
pub const DEFAULT_PROFILE_WAIT_BASE_MS: u64 = 200;
pub const DEFAULT_PROFILE_WAIT_MAX_MS: u64 = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing config: env var {var} not set")]
    MissingVar { var: String },
    #[error("config parse failed: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Connection settings for the hosted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL without a trailing slash.
    pub url: String,
    /// Public (anon) API key sent as `apikey`.
    pub anon_key: String,
    pub timeouts: Timeouts,
    /// Where the backend handle keeps its session tokens. `None` keeps them in memory.
    pub session_path: Option<PathBuf>,
}

impl BackendConfig {
    /// Required: `BACKEND_URL`, `BACKEND_ANON_KEY`.
    ///
    /// Optional:
    /// - `BACKEND_REQUEST_TIMEOUT_SECS`: default 30
    /// - `BACKEND_CONNECT_TIMEOUT_SECS`: default 10
    /// - `BACKEND_SESSION_PATH`: default `taskboard-session.json`
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the URL is not http(s).
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required_var("BACKEND_URL")?;
        let anon_key = required_var("BACKEND_ANON_KEY")?;
        let timeouts = Timeouts {
            request_secs: env_parse("BACKEND_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("BACKEND_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let session_path =
            PathBuf::from(std::env::var("BACKEND_SESSION_PATH").unwrap_or_else(|_| DEFAULT_SESSION_PATH.to_owned()));

        Ok(Self { url: normalize_url(&url)?, anon_key, timeouts, session_path: Some(session_path) })
    }
}

/// Bounded backoff used while waiting for the backend to create a profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileWaitConfig {
    /// Number of reads before falling back to an explicit insert.
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ProfileWaitConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_PROFILE_WAIT_ATTEMPTS,
            base_delay_ms: DEFAULT_PROFILE_WAIT_BASE_MS,
            max_delay_ms: DEFAULT_PROFILE_WAIT_MAX_MS,
        }
    }
}

impl ProfileWaitConfig {
    /// `PROFILE_WAIT_ATTEMPTS`, `PROFILE_WAIT_BASE_MS`, `PROFILE_WAIT_MAX_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            attempts: env_parse("PROFILE_WAIT_ATTEMPTS", DEFAULT_PROFILE_WAIT_ATTEMPTS),
            base_delay_ms: env_parse("PROFILE_WAIT_BASE_MS", DEFAULT_PROFILE_WAIT_BASE_MS),
            max_delay_ms: env_parse("PROFILE_WAIT_MAX_MS", DEFAULT_PROFILE_WAIT_MAX_MS),
        }
    }

    /// Delay before read `attempt` (1-based): doubles from the base, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self.base_delay_ms.saturating_mul(1_u64 << shift).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Everything the binary needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendConfig,
    /// Named blob holding the persisted `{user, profile}`.
    pub auth_state_path: PathBuf,
    pub profile_wait: ProfileWaitConfig,
}

impl Config {
    /// Build the full config. `AUTH_STATE_PATH` defaults to `taskboard-auth.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend config is incomplete.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            backend: BackendConfig::from_env()?,
            auth_state_path: PathBuf::from(
                std::env::var("AUTH_STATE_PATH").unwrap_or_else(|_| DEFAULT_AUTH_STATE_PATH.to_owned()),
            ),
            profile_wait: ProfileWaitConfig::from_env(),
        })
    }
}

fn required_var(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar { var: key.to_owned() })
}

pub(crate) fn normalize_url(raw: &str) -> Result<String, ConfigError> {
    let url = raw.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Parse(format!("BACKEND_URL must be http(s): {raw}")));
    }
    Ok(url.to_owned())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
