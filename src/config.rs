//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `JWT_SECRET` - HS256 signing secret (min 32 chars, no placeholders)
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 3000)
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `JWT_TTL_HOURS` - Bearer token lifetime (default: 24)
//! - `UPLOAD_DIR` - Where product photos are written (default: public/uploads/products)
//! - `APP_ENV` - `development` or `production` (default: development)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_JWT_TTL_HOURS: i64 = 24;
const DEFAULT_UPLOAD_DIR: &str = "public/uploads/products";

/// Values that must never be used as a signing secret.
const PLACEHOLDER_SECRETS: &[&str] = &["your_jwt_secret", "changeme", "secret"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Development responses include the error chain of dependency failures.
    pub const fn exposes_error_details(self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
}

/// Loads configuration from the process environment.
pub fn load() -> Result<AppConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds configuration from any key lookup, so tests never touch the real environment.
pub fn from_lookup<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &str| {
        lookup(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    };

    let environment = match lookup("APP_ENV").as_deref() {
        None | Some("development") => Environment::Development,
        Some("production") => Environment::Production,
        Some(other) => {
            return Err(ConfigError::InvalidEnvVar(
                "APP_ENV".into(),
                format!("unknown environment {other}"),
            ));
        }
    };

    let host = parse_or(&lookup, "HOST", IpAddr::from([0, 0, 0, 0]))?;
    let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
    let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
    let token_ttl_hours = parse_or(&lookup, "JWT_TTL_HOURS", DEFAULT_JWT_TTL_HOURS)?;
    if token_ttl_hours <= 0 {
        return Err(ConfigError::InvalidEnvVar(
            "JWT_TTL_HOURS".into(),
            "must be positive".into(),
        ));
    }

    let jwt_secret = SecretString::from(required("JWT_SECRET")?);
    validate_secret("JWT_SECRET", &jwt_secret)?;

    Ok(AppConfig {
        environment,
        server: ServerConfig { host, port },
        database: DatabaseConfig {
            url: SecretString::from(required("DATABASE_URL")?),
            max_connections,
        },
        auth: AuthConfig {
            jwt_secret,
            token_ttl_hours,
        },
        uploads: UploadConfig {
            dir: lookup("UPLOAD_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR), PathBuf::from),
        },
    })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

fn validate_secret(key: &str, secret: &SecretString) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if PLACEHOLDER_SECRETS
        .iter()
        .any(|placeholder| value.eq_ignore_ascii_case(placeholder))
    {
        return Err(ConfigError::InsecureSecret(
            key.to_string(),
            "placeholder value".into(),
        ));
    }
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            key.to_string(),
            format!("must be at least {MIN_JWT_SECRET_LENGTH} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("JWT_SECRET", SECRET),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.uploads.dir, PathBuf::from("public/uploads/products"));
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = from_lookup(lookup(&[("JWT_SECRET", SECRET)])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "DATABASE_URL"));
    }

    #[test]
    fn placeholder_and_short_secrets_are_rejected() {
        let err = from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("JWT_SECRET", "your_jwt_secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(..)));

        let err = from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("JWT_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(..)));
    }

    #[test]
    fn invalid_port_is_reported() {
        let err = from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("JWT_SECRET", SECRET),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "PORT"));
    }

    #[test]
    fn production_hides_error_details() {
        let config = from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("JWT_SECRET", SECRET),
            ("APP_ENV", "production"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert!(!config.environment.exposes_error_details());
        assert!(Environment::Development.exposes_error_details());
    }
}
