//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use std::env;
use std::path::PathBuf;

use domain::service::ServiceOptions;
use domain::validate::{Validator, DEFAULT_BLOCKLIST};
use subtle::ConstantTimeEq;

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "demo";
const MAX_CODE_LENGTH: usize = 64;

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
#[derive(Debug, thiserror::Error)]
#[error("Configuration error for {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

/// Credentials accepted on `/admin` routes.
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    /// Compares in constant time; both fields are always checked.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }

    fn is_default(&self) -> bool {
        self.matches(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: PathBuf,
    /// Log format
    pub log_format: LogFormat,
    /// Custom shortlink domain for generated URLs
    pub shortlink_domain: Option<String>,
    /// Basic auth credentials for admin routes
    pub admin: AdminCredentials,
    /// Target URL validator with the compiled blocklist
    pub validator: Validator,
    /// Code length and retry budget
    pub service_options: ServiceOptions,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = match get("PORT") {
            Some(s) => s.parse().map_err(|e| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}': {}", s, e),
            })?,
            None => 3000,
        };

        // Storage provider
        let storage_provider =
            StorageProvider::from_str(&get("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));

        // DB path (for sqlite)
        let db_path = get("DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/shorten.db"));

        // Log format
        let log_format = LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Shortlink domain
        let shortlink_domain = get("SHORTLINK_DOMAIN").filter(|s| !s.is_empty());

        // Admin credentials
        let admin = AdminCredentials {
            username: get("ADMIN_USERNAME").unwrap_or_else(|| DEFAULT_ADMIN_USERNAME.into()),
            password: get("ADMIN_PASSWORD").unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.into()),
        };
        if admin.username.is_empty() || admin.username.contains(':') {
            return Err(ConfigError {
                field: "ADMIN_USERNAME",
                message: "Must be non-empty and must not contain ':'".into(),
            });
        }

        // Blocklist
        let pattern = get("BLOCKLIST_PATTERN").unwrap_or_else(|| DEFAULT_BLOCKLIST.into());
        let validator = Validator::new(&pattern).map_err(|e| ConfigError {
            field: "BLOCKLIST_PATTERN",
            message: format!("Invalid regex '{}': {}", pattern, e),
        })?;

        // Code generation
        let defaults = ServiceOptions::default();
        let code_length = parse_bounded(&get, "CODE_LENGTH", defaults.code_length, 1, MAX_CODE_LENGTH)?;
        let max_attempts =
            parse_bounded(&get, "CODE_MAX_ATTEMPTS", defaults.max_attempts, 1, usize::MAX)?;

        Ok(Self {
            port,
            storage_provider,
            db_path,
            log_format,
            shortlink_domain,
            admin,
            validator,
            service_options: ServiceOptions {
                code_length,
                max_attempts,
            },
        })
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if self.admin.is_default() {
            tracing::warn!(
                "ADMIN_USERNAME/ADMIN_PASSWORD not set: admin routes accept the default \
                 credentials. DO NOT USE IN PRODUCTION."
            );
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: short URLs are lost on restart.");
        }
    }
}

fn parse_bounded<F>(
    get: &F,
    field: &'static str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(field) else {
        return Ok(default);
    };
    match raw.parse::<usize>() {
        Ok(n) if (min..=max).contains(&n) => Ok(n),
        _ => Err(ConfigError {
            field,
            message: format!("Expected an integer in {}..={}, got '{}'", min, max, raw),
        }),
    }
}
