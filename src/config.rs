use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{DEFAULT_KEY_PREFIX, DEFAULT_REDIS_TIMEOUT_MS, DEFAULT_SWEEP_INTERVAL_SECS};
use crate::limiter::{ActionLimit, RateLimitAction, RateLimitTable};
use crate::store::AdmissionMode;

/// Which counting store backs the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
    Embedded,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            "embedded" | "redb" => Ok(StoreBackend::Embedded),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub allowed_origins: Vec<String>,
    pub backend: StoreBackend,
    pub redis_url: String,
    pub redis_admission_mode: AdmissionMode,
    pub redis_timeout_ms: u64,
    pub database_path: String,
    pub key_prefix: String,
    pub limits: RateLimitTable,
    /// Seconds between expiry sweeps; 0 disables the sweeper
    pub sweep_interval_secs: u64,
    pub trust_forwarded_headers: bool,
    /// `X-User-Id` is set by an upstream session layer
    pub trust_user_id_header: bool,
    /// Enables the reset endpoint when set
    pub admin_secret_key: Option<String>,
    pub identifier_pepper: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            environment: "development".to_string(),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_admission_mode: AdmissionMode::Atomic,
            redis_timeout_ms: DEFAULT_REDIS_TIMEOUT_MS,
            database_path: "./data/ratelimits.redb".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            limits: RateLimitTable::default(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            trust_forwarded_headers: true,
            trust_user_id_header: false,
            admin_secret_key: None,
            identifier_pepper: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Config::default();

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Ok(Config {
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_var(&lookup, "SERVER_PORT", defaults.server_port)?,
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            allowed_origins,
            backend: parse_var(&lookup, "RATE_LIMIT_BACKEND", defaults.backend)?,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            redis_admission_mode: parse_var(
                &lookup,
                "REDIS_ADMISSION_MODE",
                defaults.redis_admission_mode,
            )?,
            redis_timeout_ms: parse_var(&lookup, "REDIS_TIMEOUT_MS", defaults.redis_timeout_ms)?,
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            key_prefix: lookup("RATE_LIMIT_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            limits: limits_from(&lookup)?,
            sweep_interval_secs: parse_var(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            trust_forwarded_headers: parse_var(
                &lookup,
                "TRUST_FORWARDED_HEADERS",
                defaults.trust_forwarded_headers,
            )?,
            trust_user_id_header: parse_var(
                &lookup,
                "TRUST_USER_ID_HEADER",
                defaults.trust_user_id_header,
            )?,
            admin_secret_key: lookup("ADMIN_SECRET_KEY").filter(|k| !k.is_empty()),
            identifier_pepper: lookup("IDENTIFIER_PEPPER").filter(|p| !p.is_empty()),
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

/// Default table with `RATE_LIMIT_<ACTION>=limit/window_secs` overrides applied
fn limits_from(lookup: &impl Fn(&str) -> Option<String>) -> Result<RateLimitTable, String> {
    let mut table = RateLimitTable::default();

    for action in RateLimitAction::ALL {
        let key = action.env_var();
        if let Some(value) = lookup(&key) {
            let limit = ActionLimit::parse(&value).map_err(|e| format!("Invalid {}: {}", key, e))?;
            table = table.with_limit(action, limit);
        }
    }

    Ok(table)
}
