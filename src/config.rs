use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Values come from `config/default.toml` (optional) overridden by
/// `APP__`-prefixed environment variables, e.g. `APP__DATABASE_URL`.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "database_url must not be empty"))]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment ("development", "test", "production")
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Maximum database connections in the pool
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum database connections in the pool
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_env() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}

fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}

impl AppConfig {
    /// Construct a configuration directly; used by tests and tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads configuration from files and environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join(&run_env)).required(false));

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let config: AppConfig = builder.build()?.try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(
        environment = %config.environment,
        host = %config.host,
        port = config.port,
        "Configuration loaded"
    );

    Ok(config)
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level so operators can
/// raise verbosity per-module without a config change.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );
        assert_eq!(cfg.log_level(), "info");
        assert!(!cfg.is_production());
        assert_eq!(cfg.server_addr(), "127.0.0.1:8080");
        assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    }

    #[test]
    fn empty_database_url_fails_validation() {
        let cfg = AppConfig::new(
            String::new(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );
        assert!(cfg.validate().is_err());
    }
}
