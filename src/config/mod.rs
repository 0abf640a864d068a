//! # Configuration Management
//!
//! Layered configuration for the Certplane service. See [`settings`] for the
//! individual sections and how values are resolved.

pub mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, ObservabilityConfig, ProvisioningConfig, ServerConfig,
    ENV_PREFIX,
};
