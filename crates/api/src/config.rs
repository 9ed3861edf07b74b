//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use booking::RetryPolicy;
use thiserror::Error;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}', expected 'pretty' or 'json'")),
        }
    }
}

/// A variable was set to a value that could not be parsed.
#[derive(Debug, Error)]
#[error("invalid value for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub reason: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` PostgreSQL connection string; unset selects the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` pool size (default: `10`)
/// - `LOCK_TIMEOUT_MS` wait for a showtime hold (default: `2000`)
/// - `RESERVE_MAX_RETRIES` retries after a hold timeout (default: `3`)
/// - `RETRY_INITIAL_DELAY_MS` first backoff delay (default: `25`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub lock_timeout: Duration,
    pub max_retries: usize,
    pub retry_initial_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT")?.unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&var, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse(&var, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            lock_timeout: parse(&var, "LOCK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            max_retries: parse(&var, "RESERVE_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_initial_delay: parse(&var, "RETRY_INITIAL_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_initial_delay),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_initial_delay)
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            lock_timeout: Duration::from_millis(2000),
            max_retries: 3,
            retry_initial_delay: Duration::from_millis(25),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.database_max_connections, 10);
    }

    #[test]
    fn test_overrides() {
        let config = from_vars(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/booking"),
            ("LOCK_TIMEOUT_MS", "500"),
            ("RESERVE_MAX_RETRIES", "0"),
            ("RETRY_INITIAL_DELAY_MS", "5"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/booking")
        );
        assert_eq!(config.lock_timeout, Duration::from_millis(500));

        let retry = config.retry_policy();
        assert_eq!(retry.max_retries, 0);
        assert_eq!(retry.initial_delay, Duration::from_millis(5));
    }

    #[test]
    fn test_blank_database_url_selects_memory() {
        let config = from_vars(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = from_vars(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.name, "PORT");

        let err = from_vars(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(err.to_string().contains("LOG_FORMAT"));
    }
}
