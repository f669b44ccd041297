use std::env;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid {name} '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Mongo,
    /// Process-local, lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    /// Prefix for uploaded image names, e.g. `http://localhost:5000`.
    pub base_url: String,
}

impl Config {
    /// Reads the process environment; `main` loads `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let invalid = |name: &'static str, value: String| ConfigError::Invalid { name, value };

        let store = match var("STORE").as_deref() {
            None | Some("mongo") => StoreKind::Mongo,
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(invalid("STORE", other.to_string())),
        };
        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match var("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| invalid("PORT", raw))?,
            None => 5000,
        };
        let database_url = var("DATABASE_URL").unwrap_or_else(|| "mongodb://127.0.0.1:27017".to_string());
        let database_name = var("DATABASE_NAME").unwrap_or_else(|| "item-rental".to_string());
        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let jwt_ttl_hours = match var("JWT_TTL_HOURS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(hours) if hours > 0 => hours,
                _ => return Err(invalid("JWT_TTL_HOURS", raw)),
            },
            None => 24,
        };
        let base_url = var("BASE_URL").unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Config {
            store,
            host,
            port,
            database_url,
            database_name,
            jwt_secret,
            jwt_ttl_hours,
            base_url,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_need_only_a_secret() {
        let config = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.store, StoreKind::Mongo);
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
        assert_eq!(config.database_name, "item-rental");
        assert_eq!(config.jwt_ttl_hours, 24);
        assert_eq!(config.base_url, "http://localhost:5000");
    }

    #[test]
    fn missing_secret_is_reported() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
        assert_eq!(load(&[("JWT_SECRET", "  ")]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn bad_values_are_reported_by_name() {
        let err = load(&[("JWT_SECRET", "s"), ("PORT", "http")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "PORT",
                value: "http".into()
            }
        );
        assert_eq!(err.to_string(), "Invalid PORT 'http'");
        assert!(load(&[("JWT_SECRET", "s"), ("JWT_TTL_HOURS", "0")]).is_err());
        assert!(load(&[("JWT_SECRET", "s"), ("STORE", "redis")]).is_err());

        let config = load(&[("JWT_SECRET", "s"), ("STORE", "memory"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.base_url, "http://localhost:8080");
    }
}
