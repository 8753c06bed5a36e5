use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::database::StoreSettings;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DB_CONNECTION_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_MAX_DB_RETRIES: u32 = 5;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable {0} not set.")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Environment {
    Dev,
    Production,
}

impl Environment {
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Environment::Dev => "debug",
            Environment::Production => "info",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => f.write_str("dev"),
            Environment::Production => f.write_str("production"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "production" => Ok(Environment::Production),
            other => Err(format!("expected 'dev' or 'production', got '{other}'")),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub port: u16,
    pub database_uri: String,
    pub db_connection_interval: Duration,
    pub max_db_retries: u32,
    pub store_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env: Environment = parse_required(&lookup, "ENV")?;

        let uri_key = match env {
            Environment::Dev => "DATABASE_URI_DEV",
            Environment::Production => "DATABASE_URI_PRODUCTION",
        };
        let database_uri = lookup(uri_key)
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(ConfigError::Missing(uri_key))?;

        let port: u16 = parse_optional(&lookup, "PORT", DEFAULT_PORT)?;
        if port == 0 {
            return Err(invalid("PORT", "must be an integer between 1 and 65535"));
        }

        let interval: u64 =
            parse_optional(&lookup, "DB_CONNECTION_INTERVAL", DEFAULT_DB_CONNECTION_INTERVAL_MS)?;
        if interval == 0 {
            return Err(invalid("DB_CONNECTION_INTERVAL", "must be a positive integer"));
        }

        let max_db_retries: u32 = parse_optional(&lookup, "MAX_DB_RETRIES", DEFAULT_MAX_DB_RETRIES)?;

        let store_timeout: u64 =
            parse_optional(&lookup, "STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS)?;
        if store_timeout == 0 {
            return Err(invalid("STORE_TIMEOUT_MS", "must be a positive integer"));
        }

        Ok(Self {
            env,
            port,
            database_uri,
            db_connection_interval: Duration::from_millis(interval),
            max_db_retries,
            store_timeout: Duration::from_millis(store_timeout),
        })
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            uri: self.database_uri.clone(),
            retry_interval: self.db_connection_interval,
            max_retries: self.max_db_retries,
            call_timeout: self.store_timeout,
        }
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

fn parse_required<F, T>(lookup: &F, key: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key).ok_or(ConfigError::Missing(key))?;
    raw.trim().parse().map_err(|e: T::Err| invalid(key, &e.to_string()))
}

fn parse_optional<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(key, &e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("ENV", "dev"), ("DATABASE_URI_DEV", "sqlite://dev.db")]).unwrap();
        assert_eq!(config.env, Environment::Dev);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database_uri, "sqlite://dev.db");
        assert_eq!(config.db_connection_interval, Duration::from_millis(5000));
        assert_eq!(config.max_db_retries, DEFAULT_MAX_DB_RETRIES);
    }

    #[test]
    fn test_environment_selects_database_uri() {
        let config = config_from(&[
            ("ENV", "production"),
            ("PORT", "8080"),
            ("DATABASE_URI_DEV", "sqlite://dev.db"),
            ("DATABASE_URI_PRODUCTION", "sqlite:///var/lib/firewall/rules.db"),
            ("DB_CONNECTION_INTERVAL", "250"),
            ("MAX_DB_RETRIES", "3"),
        ])
        .unwrap();
        assert_eq!(config.database_uri, "sqlite:///var/lib/firewall/rules.db");
        assert_eq!(config.port, 8080);

        let settings = config.store_settings();
        assert_eq!(settings.retry_interval, Duration::from_millis(250));
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(config_from(&[]), Err(ConfigError::Missing("ENV")));
        assert_eq!(
            config_from(&[("ENV", "production"), ("DATABASE_URI_DEV", "sqlite://dev.db")]),
            Err(ConfigError::Missing("DATABASE_URI_PRODUCTION"))
        );
    }

    #[test]
    fn test_zero_retries_allowed() {
        let config = config_from(&[
            ("ENV", "dev"),
            ("DATABASE_URI_DEV", ":memory:"),
            ("MAX_DB_RETRIES", "0"),
        ])
        .unwrap();
        assert_eq!(config.store_settings().max_retries, 0);
    }

    #[test]
    fn test_invalid_values() {
        let base = [("ENV", "dev"), ("DATABASE_URI_DEV", ":memory:")];
        for (key, value) in [
            ("PORT", "0"),
            ("PORT", "70000"),
            ("DB_CONNECTION_INTERVAL", "0"),
            ("MAX_DB_RETRIES", "-1"),
            ("STORE_TIMEOUT_MS", "soon"),
        ] {
            let mut pairs = base.to_vec();
            pairs.push((key, value));
            let err = config_from(&pairs).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key), "{key}={value}");
        }

        assert!(matches!(
            config_from(&[("ENV", "staging")]),
            Err(ConfigError::Invalid { key: "ENV", .. })
        ));
    }
}
