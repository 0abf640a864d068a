//! # Configuration Settings
//!
//! Defines the configuration structure for the Certplane service.
//!
//! Values are layered: built-in defaults, then an optional file (any format the
//! `config` crate understands, picked by extension), then `CERTPLANE__*`
//! environment variables, e.g. `CERTPLANE__SERVER__PORT=8443`.

use crate::errors::{CertplaneError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CERTPLANE";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP API server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Bearer token configuration
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Provisioning job queue configuration
    #[validate(nested)]
    pub provisioning: ProvisioningConfig,

    /// Logging and metrics configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(CertplaneError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_allowed_origins")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(CertplaneError::from)?;
        self.validate_custom()
    }

    /// Checks that span more than one section or that the validator crate cannot express
    fn validate_custom(&self) -> Result<()> {
        if self.observability.enable_metrics && self.observability.metrics_port == self.server.port
        {
            return Err(CertplaneError::validation(
                "API server and metrics exporter ports cannot be the same",
            ));
        }

        if !self.database.is_sqlite() {
            return Err(CertplaneError::validation_field(
                "Database URL must start with 'sqlite:'",
                "database.url",
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(CertplaneError::validation(
                "min_connections cannot be greater than max_connections",
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Maximum request body size in bytes
    #[validate(range(min = 1024, message = "Max body size must be at least 1KB"))]
    pub max_body_size: usize,

    /// CORS allowed origins (empty = CORS disabled)
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
            cors_allowed_origins: vec![],
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Run embedded migrations when the pool is created
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/certplane.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600, // 10 minutes
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// In-memory database, used by tests and the `--ephemeral` serve flag.
    ///
    /// A single connection keeps every query on the same in-memory database.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout_seconds: 0,
            auto_migrate: true,
            ..Default::default()
        }
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }
}

/// Bearer token configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for token signing/verification
    #[validate(length(min = 32, message = "JWT secret must be at least 32 characters long"))]
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[validate(length(min = 1, message = "JWT issuer cannot be empty"))]
    pub jwt_issuer: String,

    /// Lifetime of tokens minted by `certplane issue-token`, in seconds
    #[validate(range(
        min = 300,
        max = 2_592_000,
        message = "Token expiry must be between 5 minutes and 30 days"
    ))]
    pub token_expiry_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "certplane-default-secret-please-change-in-production".to_string(),
            jwt_issuer: "certplane".to_string(),
            token_expiry_seconds: 3600, // 1 hour
        }
    }
}

/// Provisioning job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Number of worker tasks executing provisioning jobs
    #[validate(range(min = 1, max = 64, message = "Worker count must be between 1 and 64"))]
    pub worker_count: usize,

    /// Jobs that may wait in the queue before enqueue starts failing
    #[validate(range(
        min = 1,
        max = 100_000,
        message = "Queue capacity must be between 1 and 100000"
    ))]
    pub queue_capacity: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { worker_count: 2, queue_capacity: 256 }
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is not set
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON structured logs instead of human-readable lines
    pub json_logs: bool,

    /// Install the Prometheus exporter
    pub enable_metrics: bool,

    /// Prometheus exporter port
    #[validate(range(min = 1, message = "Metrics port must be between 1 and 65535"))]
    pub metrics_port: u16,

    /// Service name attached to startup logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "certplane".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address
    pub fn metrics_bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.metrics_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_bind_address() {
        let config = ServerConfig { host: "0.0.0.0".to_string(), port: 8080, ..Default::default() };
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_database_config_timeouts() {
        let config = DatabaseConfig {
            connect_timeout_seconds: 15,
            idle_timeout_seconds: 300,
            ..Default::default()
        };
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));

        let config_no_idle = DatabaseConfig { idle_timeout_seconds: 0, ..Default::default() };
        assert_eq!(config_no_idle.idle_timeout(), None);
    }

    #[test]
    fn test_in_memory_database_config() {
        let config = DatabaseConfig::in_memory();
        assert!(config.is_sqlite());
        assert_eq!(config.max_connections, 1);
        assert!(config.auto_migrate);
    }

    #[test]
    fn test_config_validation_errors() {
        let mut config = AppConfig::default();
        config.observability.enable_metrics = true;
        config.observability.metrics_port = config.server.port;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.url = "postgresql://localhost/certs".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.min_connections = 20;
        config.database.max_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.provisioning.worker_count = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.max_connections = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().expect("temp file");
        writeln!(
            file,
            r#"
[server]
port = 8443

[provisioning]
worker_count = 4
queue_capacity = 16
"#
        )
        .expect("write config");

        let config = AppConfig::load(Some(file.path())).expect("load config");
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.provisioning.worker_count, 4);
        assert_eq!(config.provisioning.queue_capacity, 16);
        // untouched sections keep their defaults
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.auth.jwt_issuer, "certplane");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/certplane.toml")));
        assert!(matches!(result, Err(CertplaneError::Config { .. })));
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().expect("temp file");
        writeln!(file, "[auth]\njwt_secret = \"too-short\"").expect("write config");

        let result = AppConfig::load(Some(file.path()));
        assert!(matches!(result, Err(CertplaneError::Validation { .. })));
    }
}
