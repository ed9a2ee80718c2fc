//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::fetch::MAX_TRANSACTIONS_PER_SYNC;

/// Default base URL of the Tesote API
pub const DEFAULT_TESOTE_API_URL: &str = "https://equipo.tesote.com/api/v2";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Key expected in `X-API-Key` on admin routes; admin routes are closed when unset
    pub admin_api_key: Option<String>,

    pub tesote: TesoteConfig,
}

/// Tesote integration settings
#[derive(Debug, Clone)]
pub struct TesoteConfig {
    pub api_url: String,

    /// Bearer token; syncs fail with a configuration error without it
    pub api_token: Option<String>,

    /// Run the scheduled sync
    pub auto_sync: bool,

    /// Date window of a sync for accounts without cursor
    pub sync_days: i64,

    /// Transactions kept per account sync, at most `MAX_TRANSACTIONS_PER_SYNC`
    pub max_transactions: usize,

    /// Accept inbound webhooks
    pub webhook_enabled: bool,

    pub sync_interval: Duration,

    /// Company owning the synchronized accounts
    pub company_id: Uuid,
}

impl Default for TesoteConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_TESOTE_API_URL.to_string(),
            api_token: None,
            auto_sync: false,
            sync_days: 7,
            max_transactions: 100,
            webhook_enabled: false,
            sync_interval: Duration::from_secs(86_400),
            company_id: Uuid::nil(),
        }
    }
}

/// Parse an optional variable, falling back to `default`
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name)),
        _ => Ok(default),
    }
}

fn parse_flag(name: &'static str) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name)),
        },
        Err(_) => Ok(false),
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 10)?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_var("PORT", 3000)?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            admin_api_key: optional_var("ADMIN_API_KEY"),
            tesote: TesoteConfig::from_env()?,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl TesoteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = TesoteConfig::default();

        let sync_days: i64 = parse_var("TESOTE_SYNC_DAYS", defaults.sync_days)?;
        if sync_days < 1 {
            return Err(ConfigError::InvalidValue("TESOTE_SYNC_DAYS"));
        }
        let max_transactions: usize =
            parse_var("TESOTE_MAX_TRANSACTIONS", defaults.max_transactions)?;
        if max_transactions == 0 || max_transactions > MAX_TRANSACTIONS_PER_SYNC {
            return Err(ConfigError::InvalidValue("TESOTE_MAX_TRANSACTIONS"));
        }
        let interval_secs: u64 = parse_var(
            "TESOTE_SYNC_INTERVAL_SECS",
            defaults.sync_interval.as_secs(),
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue("TESOTE_SYNC_INTERVAL_SECS"));
        }

        Ok(Self {
            api_url: optional_var("TESOTE_API_URL").unwrap_or(defaults.api_url),
            api_token: optional_var("TESOTE_API_TOKEN"),
            auto_sync: parse_flag("TESOTE_AUTO_SYNC")?,
            sync_days,
            max_transactions,
            webhook_enabled: parse_flag("TESOTE_WEBHOOK_ENABLED")?,
            sync_interval: Duration::from_secs(interval_secs),
            company_id: parse_var("TESOTE_COMPANY_ID", defaults.company_id)?,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
