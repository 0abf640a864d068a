//! # Structured Logging
//!
//! Subscriber setup and span macros. `RUST_LOG` wins over
//! `observability.log_level` when both are set.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{CertplaneError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Create a tracing span for request tracking.
///
/// ```rust,ignore
/// let span = request_span!("GET", "/api/v1/certificates");
/// let span = request_span!("DELETE", path, certificate_id = 7);
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            user_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            user_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for a provisioning job run.
#[macro_export]
macro_rules! job_span {
    ($name:expr) => {
        tracing::info_span!("job", job = %$name, job_id = %uuid::Uuid::new_v4())
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!("job", job = %$name, job_id = %uuid::Uuid::new_v4(), $($field)*)
    };
}

/// Install the global subscriber.
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            CertplaneError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| CertplaneError::config(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        database_type = "sqlite",
        auto_migrate = config.database.auto_migrate,
        provisioning_workers = config.provisioning.worker_count,
        provisioning_queue_capacity = config.provisioning.queue_capacity,
        metrics_enabled = config.observability.enable_metrics,
        cors_origins = config.server.cors_allowed_origins.len(),
        "Certplane configuration"
    );
}
