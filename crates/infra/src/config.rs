//! Ledger configuration, read from `FOODTRUST_*` environment variables.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

pub const ENV_DEFAULT_PAGE_SIZE: &str = "FOODTRUST_DEFAULT_PAGE_SIZE";
pub const ENV_MAX_PAGE_SIZE: &str = "FOODTRUST_MAX_PAGE_SIZE";
pub const ENV_RECENT_READINGS_LIMIT: &str = "FOODTRUST_RECENT_READINGS_LIMIT";
pub const ENV_ANALYTICS_WINDOW_DAYS: &str = "FOODTRUST_ANALYTICS_WINDOW_DAYS";
pub const ENV_APPEND_RETRIES: &str = "FOODTRUST_APPEND_RETRIES";
pub const ENV_SCAN_BASE_URL: &str = "FOODTRUST_SCAN_BASE_URL";
pub const ENV_DATABASE_URL: &str = "FOODTRUST_DATABASE_URL";
pub const ENV_REDIS_URL: &str = "FOODTRUST_REDIS_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Used when a caller asks for recent readings without a count.
    pub recent_readings_limit: usize,
    pub analytics_window_days: u32,
    /// Optimistic-conflict retries per command.
    pub append_retries: u32,
    /// Prefix for scan URLs handed to QR collaborators.
    pub scan_base_url: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            recent_readings_limit: 10,
            analytics_window_days: 7,
            append_retries: 3,
            scan_base_url: "http://localhost:3000/scan".to_string(),
            database_url: None,
            redis_url: None,
        }
    }
}

impl LedgerConfig {
    /// Defaults overridden by any `FOODTRUST_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            default_page_size: parse_positive(&lookup, ENV_DEFAULT_PAGE_SIZE, defaults.default_page_size)?,
            max_page_size: parse_positive(&lookup, ENV_MAX_PAGE_SIZE, defaults.max_page_size)?,
            recent_readings_limit: parse_positive(
                &lookup,
                ENV_RECENT_READINGS_LIMIT,
                defaults.recent_readings_limit,
            )?,
            analytics_window_days: parse_positive(
                &lookup,
                ENV_ANALYTICS_WINDOW_DAYS,
                defaults.analytics_window_days,
            )?,
            append_retries: parse_value(&lookup, ENV_APPEND_RETRIES, defaults.append_retries)?,
            scan_base_url: non_empty(&lookup, ENV_SCAN_BASE_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.scan_base_url),
            database_url: non_empty(&lookup, ENV_DATABASE_URL),
            redis_url: non_empty(&lookup, ENV_REDIS_URL),
        };

        if config.default_page_size > config.max_page_size {
            return Err(ConfigError::Invalid {
                key: ENV_DEFAULT_PAGE_SIZE.to_string(),
                value: format!(
                    "{} (exceeds {ENV_MAX_PAGE_SIZE}={})",
                    config.default_page_size, config.max_page_size
                ),
            });
        }

        Ok(config)
    }

    /// Clamp a caller-supplied page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }

    /// URL a QR collaborator encodes for `batch_id`.
    pub fn scan_url(&self, batch_id: &foodtrust_core::BatchId) -> String {
        format!("{}/{}", self.scan_base_url, batch_id)
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match non_empty(lookup, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn parse_positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default + ToString,
{
    let value = parse_value(lookup, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}
