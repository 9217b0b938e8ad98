use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_UPLOAD_DIR: &str = "static/uploads";
const DEFAULT_SESSION_TTL_MINUTES: i64 = 120;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";
pub(crate) const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

/// HS256 keys shorter than this are refused at start-up.
const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("SESSION_SECRET must be at least {MIN_SESSION_SECRET_LEN} bytes")]
    WeakSessionSecret,
}

/// Process-wide settings, resolved once at start-up and handed to constructors.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub session_secret: String,
    pub session_ttl_minutes: i64,
    pub password_pepper: String,
    pub upload_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub allowed_origins: String,
    pub production: bool,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let session_secret =
            get("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::WeakSessionSecret);
        }
        let password_pepper =
            get("PASSWORD_PEPPER").ok_or(ConfigError::Missing("PASSWORD_PEPPER"))?;

        let host = match get("HOST") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "HOST", value })?,
            None => DEFAULT_HOST
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    key: "HOST",
                    value: DEFAULT_HOST.to_string(),
                })?,
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_or(
                get("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            session_secret,
            session_ttl_minutes: parse_or(
                get("SESSION_TTL_MINUTES"),
                "SESSION_TTL_MINUTES",
                DEFAULT_SESSION_TTL_MINUTES,
            )?,
            password_pepper,
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            host,
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: get("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/buspass"),
        ("SESSION_SECRET", "0123456789abcdef0123456789abcdef"),
        ("PASSWORD_PEPPER", "pepper"),
    ];

    #[test]
    fn test_defaults_apply_when_only_required_vars_present() {
        let config = Config::from_lookup(lookup(&REQUIRED)).expect("config builds");

        assert_eq!(config.port, 3001);
        assert_eq!(config.session_ttl_minutes, 120);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.upload_dir, PathBuf::from("static/uploads"));
        assert!(!config.production);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:3001");
    }

    #[test]
    fn test_missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_short_session_secret_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars[1] = ("SESSION_SECRET", "short");
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::WeakSessionSecret));
    }

    #[test]
    fn test_invalid_port_is_reported() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PORT", "eighty"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_production_flag_reads_rust_env() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("RUST_ENV", "Production"));
        let config = Config::from_lookup(lookup(&vars)).expect("config builds");
        assert!(config.production);
    }
}
