//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use marketplace::{DEFAULT_LAZADA_API_URL, DEFAULT_SHOPEE_API_URL};

/// Minimum accepted length of `JWT_SECRET` in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Sqlite
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path
    pub db_path: PathBuf,
    /// HMAC key for session tokens
    pub jwt_secret: String,
    /// Lifetime of session tokens and the session cookie
    pub session_ttl: chrono::Duration,
    /// Whether the session cookie carries the `Secure` attribute
    pub cookie_secure: bool,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Log format
    pub log_format: LogFormat,
    /// Per-call budget for marketplace requests
    pub marketplace_timeout: Duration,
    pub lazada_api_url: String,
    pub shopee_api_url: String,
    /// Custom shortlink domain for generated URLs
    pub shortlink_domain: Option<String>,
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_num<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|_| ConfigError {
            field,
            message: format!("'{}' is not a valid number", s),
        }),
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_num("PORT", var("PORT"), 8080)?;

        let storage_provider =
            StorageProvider::from_str(&var("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));
        let db_path = var("DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/affiliate.db"));

        // Session secret is mandatory
        let jwt_secret = var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            return Err(ConfigError {
                field: "JWT_SECRET",
                message: "Required".into(),
            });
        }
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError {
                field: "JWT_SECRET",
                message: format!("Must be at least {} bytes", MIN_SECRET_LEN),
            });
        }

        let ttl_minutes: i64 = parse_num("SESSION_TTL_MINUTES", var("SESSION_TTL_MINUTES"), 1440)?;
        if ttl_minutes <= 0 {
            return Err(ConfigError {
                field: "SESSION_TTL_MINUTES",
                message: "Must be positive".into(),
            });
        }

        let cookie_secure = match var("COOKIE_SECURE") {
            None => true,
            Some(s) => parse_bool(&s).ok_or_else(|| ConfigError {
                field: "COOKIE_SECURE",
                message: format!("'{}' is not a boolean", s),
            })?,
        };

        // CORS allow origin
        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        let log_format = LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        let timeout_secs: u64 = parse_num(
            "MARKETPLACE_TIMEOUT_SECS",
            var("MARKETPLACE_TIMEOUT_SECS"),
            10,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError {
                field: "MARKETPLACE_TIMEOUT_SECS",
                message: "Must be positive".into(),
            });
        }

        let lazada_api_url = var("LAZADA_API_URL")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LAZADA_API_URL.into());
        let shopee_api_url = var("SHOPEE_API_URL")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SHOPEE_API_URL.into());

        // Shortlink domain
        let shortlink_domain = var("SHORTLINK_DOMAIN").filter(|s| !s.is_empty());

        Ok(Self {
            port,
            storage_provider,
            db_path,
            jwt_secret,
            session_ttl: chrono::Duration::minutes(ttl_minutes),
            cookie_secure,
            cors_allow_origin,
            log_format,
            marketplace_timeout: Duration::from_secs(timeout_secs),
            lazada_api_url,
            shopee_api_url,
            shortlink_domain,
        })
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if !self.cookie_secure {
            tracing::warn!(
                "COOKIE_SECURE=false: the session cookie is sent over plain HTTP. \
                 DO NOT USE IN PRODUCTION."
            );
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: all data is lost on restart.");
        }
    }
}
