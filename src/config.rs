//! Configuration loader for the `soilhealth` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, fmt, net::SocketAddr, str::FromStr};

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Where measurement records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("Invalid STORE_BACKEND: '{}'", other)),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Postgres => f.write_str("postgres"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Selected storage backend.
    pub store_backend: StoreBackend,

    /// PostgreSQL connection string (postgres backend only).
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Base URL of a Nominatim-compatible reverse geocoder.
    pub geocoder_url: Option<String>,

    /// Connect and request timeout for geocoder calls, in milliseconds.
    pub geocoder_timeout_ms: u32,

    /// Upper bound on records returned by an owner's listing.
    pub owner_limit_max: u32,

    /// Upper bound on records returned by public listings.
    pub public_limit_max: u32,
}

impl Config {
    /// Configuration for an in-process server, used by tests and local runs.
    pub fn in_memory(bind_addr: SocketAddr) -> Self {
        Config {
            store_backend: StoreBackend::Memory,
            db_url: None,
            db_pool_max: 1,
            bind_addr,
            geocoder_url: None,
            geocoder_timeout_ms: 3000,
            owner_limit_max: 1000,
            public_limit_max: 1000,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string (postgres backend)
///
/// Optional:
/// - `STORE_BACKEND` – `postgres` or `memory` (default: postgres)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: 0.0.0.0:8080)
/// - `GEOCODER_URL` – reverse geocoder base URL (default: disabled)
/// - `GEOCODER_TIMEOUT_MS` – geocoder timeout in ms (default: 3000)
/// - `OWNER_LIMIT_MAX` – max records per owner listing (default: 1000)
/// - `PUBLIC_LIMIT_MAX` – max public records per request (default: 1000)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let store_backend = match env::var("STORE_BACKEND") {
        Ok(v) => v.parse()?,
        Err(_) => StoreBackend::Postgres,
    };

    let db_url = match store_backend {
        StoreBackend::Postgres => Some(require_env!("DATABASE_URL")),
        StoreBackend::Memory => env::var("DATABASE_URL").ok(),
    };

    let bind_addr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;

    let geocoder_url = env::var("GEOCODER_URL").ok().filter(|v| !v.trim().is_empty());
    let geocoder_timeout_ms = parse_env_u32!("GEOCODER_TIMEOUT_MS", 3000);
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let owner_limit_max = parse_env_u32!("OWNER_LIMIT_MAX", 1000);
    let public_limit_max = parse_env_u32!("PUBLIC_LIMIT_MAX", 1000);

    Ok(Config {
        store_backend,
        db_url,
        db_pool_max,
        bind_addr,
        geocoder_url,
        geocoder_timeout_ms,
        owner_limit_max,
        public_limit_max,
    })
}

/// Mask the password component of a connection URL.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    let userinfo_start = db_url.find("://").map_or(0, |i| i + 3);
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            if colon_pos >= userinfo_start {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = self
            .db_url
            .as_deref()
            .map(mask_db_url)
            .unwrap_or_else(|| "(unset)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  STORE_BACKEND    : {}", self.store_backend);
        tracing::info!("  DATABASE_URL     : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX      : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR        : {}", self.bind_addr);
        tracing::info!(
            "  GEOCODER_URL     : {}",
            self.geocoder_url.as_deref().unwrap_or("(disabled)")
        );
        tracing::info!("  GEOCODER_TIMEOUT : {} ms", self.geocoder_timeout_ms);
        tracing::info!("  OWNER_LIMIT_MAX  : {}", self.owner_limit_max);
        tracing::info!("  PUBLIC_LIMIT_MAX : {}", self.public_limit_max);
    }
}
