//! Application configuration
//!
//! Every section has defaults, so a partial JSON or TOML file (or no file
//! at all) yields a usable configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    AUTH_PATH, CART_TTL_SECS, DEFAULT_BACKEND_URL, DEFAULT_COOLDOWN_SECS,
    DEFAULT_FAILURE_THRESHOLD, MAX_AUTH_RETRIES, QUEUE_ENTRY_TTL_SECS, QUEUE_MAX_ENTRIES,
    SESSION_REFRESH_THRESHOLD_SECS, USER_CACHE_TTL_SECS,
};
use crate::errors::{Result, SuperAppError};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub session: SessionConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub jobs: JobsConfig,
}

impl Config {
    /// Reject values the runtime components cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(SuperAppError::Config("backend.base_url must not be empty".into()));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(SuperAppError::Config("backend.request_timeout_secs must be > 0".into()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(SuperAppError::Config(
                "circuit_breaker.failure_threshold must be > 0".into(),
            ));
        }
        if self.session.refresh_threshold_secs < 0 {
            return Err(SuperAppError::Config(
                "session.refresh_threshold_secs must not be negative".into(),
            ));
        }
        if self.sync.max_entries == 0 {
            return Err(SuperAppError::Config("sync.max_entries must be > 0".into()));
        }
        if self.jobs.job_timeout_secs == 0 {
            return Err(SuperAppError::Config("jobs.job_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Hosted backend endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Auth service root; `{base_url}/auth/v1` when unset
    pub auth_url: Option<String>,
    /// Public project key sent as the `apikey` header
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Extra attempts for transport failures and 5xx responses
    pub max_transport_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            auth_url: None,
            api_key: None,
            request_timeout_secs: 30,
            max_transport_retries: 2,
            retry_base_delay_ms: 200,
        }
    }
}

impl BackendConfig {
    pub fn resolved_auth_url(&self) -> String {
        match &self.auth_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/{AUTH_PATH}", self.base_url.trim_end_matches('/')),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: DEFAULT_FAILURE_THRESHOLD, cooldown_secs: DEFAULT_COOLDOWN_SECS }
    }
}

impl CircuitBreakerSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Refresh when fewer seconds than this remain
    pub refresh_threshold_secs: i64,
    pub max_auth_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_secs: SESSION_REFRESH_THRESHOLD_SECS,
            max_auth_retries: MAX_AUTH_RETRIES,
        }
    }
}

/// Offline queue, cart and cache lifetimes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub entry_ttl_secs: u64,
    pub max_entries: usize,
    pub cart_ttl_secs: u64,
    pub cache_ttl_secs: u64,
    /// How long `stop()` waits for the reconnect worker
    pub worker_stop_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            entry_ttl_secs: QUEUE_ENTRY_TTL_SECS,
            max_entries: QUEUE_MAX_ENTRIES,
            cart_ttl_secs: CART_TTL_SECS,
            cache_ttl_secs: USER_CACHE_TTL_SECS,
            worker_stop_timeout_secs: 5,
        }
    }
}

impl SyncConfig {
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    pub fn cart_ttl(&self) -> Duration {
        Duration::from_secs(self.cart_ttl_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn worker_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_stop_timeout_secs)
    }
}

/// Where durable client state lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Keep everything in memory (nothing survives a restart)
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("superapp-data"), in_memory: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = SuperAppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(SuperAppError::Config(format!("Invalid log format: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

/// Backend maintenance jobs run on a cron schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub enabled: bool,
    pub job_timeout_secs: u64,
    /// Six-field cron expressions (seconds first)
    pub cleanup_stale_drivers_cron: String,
    pub cancel_expired_bookings_cron: String,
    pub process_marketplace_commission_cron: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            job_timeout_secs: 60,
            cleanup_stale_drivers_cron: "0 */5 * * * *".to_string(),
            cancel_expired_bookings_cron: "0 */10 * * * *".to_string(),
            process_marketplace_commission_cron: "0 0 2 * * *".to_string(),
        }
    }
}

impl JobsConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}
