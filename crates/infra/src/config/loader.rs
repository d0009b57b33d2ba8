//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Read a `.env` file if one exists (values already in the environment win)
//! 2. Build the configuration from `SUPERAPP_*` variables when
//!    `SUPERAPP_BACKEND_URL` is set
//! 3. Otherwise probe well-known paths for a JSON or TOML file
//!
//! ## Environment Variables
//! - `SUPERAPP_BACKEND_URL` (required for the env path)
//! - `SUPERAPP_AUTH_URL`, `SUPERAPP_API_KEY`
//! - `SUPERAPP_REQUEST_TIMEOUT_SECS`
//! - `SUPERAPP_BREAKER_FAILURE_THRESHOLD`, `SUPERAPP_BREAKER_COOLDOWN_SECS`
//! - `SUPERAPP_SESSION_REFRESH_THRESHOLD_SECS`
//! - `SUPERAPP_QUEUE_TTL_SECS`, `SUPERAPP_CART_TTL_SECS`, `SUPERAPP_CACHE_TTL_SECS`
//! - `SUPERAPP_DATA_DIR`, `SUPERAPP_IN_MEMORY`
//! - `SUPERAPP_LOG_LEVEL`, `SUPERAPP_LOG_FORMAT`
//! - `SUPERAPP_JOBS_ENABLED`
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! `config.{json,toml}` and `superapp.{json,toml}` in the working directory,
//! its two parents, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use superapp_domain::constants::ENV_PREFIX;
use superapp_domain::{Config, LogFormat, Result, SuperAppError};

const FILE_NAMES: [&str; 4] = ["config.json", "config.toml", "superapp.json", "superapp.toml"];

/// Load configuration, environment first, then file
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Environment configuration unavailable, trying file");
            load_from_file(None)
        }
    }
}

/// Build configuration from `SUPERAPP_*` variables
///
/// # Errors
/// `SuperAppError::Config` when `SUPERAPP_BACKEND_URL` is missing, a value
/// does not parse, or the result fails validation.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    config.backend.base_url = env_var("BACKEND_URL")?;

    if let Some(url) = env_opt("AUTH_URL") {
        config.backend.auth_url = Some(url);
    }
    if let Some(key) = env_opt("API_KEY") {
        config.backend.api_key = Some(key);
    }
    if let Some(secs) = env_parse("REQUEST_TIMEOUT_SECS")? {
        config.backend.request_timeout_secs = secs;
    }

    if let Some(threshold) = env_parse("BREAKER_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = threshold;
    }
    if let Some(secs) = env_parse("BREAKER_COOLDOWN_SECS")? {
        config.circuit_breaker.cooldown_secs = secs;
    }
    if let Some(secs) = env_parse("SESSION_REFRESH_THRESHOLD_SECS")? {
        config.session.refresh_threshold_secs = secs;
    }

    if let Some(secs) = env_parse("QUEUE_TTL_SECS")? {
        config.sync.entry_ttl_secs = secs;
    }
    if let Some(secs) = env_parse("CART_TTL_SECS")? {
        config.sync.cart_ttl_secs = secs;
    }
    if let Some(secs) = env_parse("CACHE_TTL_SECS")? {
        config.sync.cache_ttl_secs = secs;
    }

    if let Some(dir) = env_opt("DATA_DIR") {
        config.storage.data_dir = PathBuf::from(dir);
    }
    config.storage.in_memory = env_bool("IN_MEMORY", config.storage.in_memory);

    if let Some(level) = env_opt("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = env_parse::<LogFormat>("LOG_FORMAT")? {
        config.logging.format = format;
    }
    config.jobs.enabled = env_bool("JOBS_ENABLED", config.jobs.enabled);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// With `path == None` the standard locations are probed
/// ([`probe_config_paths`]). The format follows the file extension.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SuperAppError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SuperAppError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SuperAppError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SuperAppError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SuperAppError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(SuperAppError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
        roots.push(cwd.join("../.."));
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_key(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

fn env_var(name: &str) -> Result<String> {
    let key = env_key(name);
    std::env::var(&key).map_err(|_| {
        SuperAppError::Config(format!("Missing required environment variable: {key}"))
    })
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(env_key(name)).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                SuperAppError::Config(format!("Invalid value for {}: {e}", env_key(name)))
            })
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(name: &str, default: bool) -> bool {
    env_opt(name)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
