//! # Certplane
//!
//! Certplane manages TLS certificate records for a reverse-proxy
//! administration backend and hands provisioning off to background jobs.
//!
//! ## Architecture
//!
//! ```text
//! REST API (axum) → CertificateService → Store / Reference Guard / Schemas
//!                          ↓
//!              ProvisioningDispatcher → JobQueue → CertificateProvisioner → Issuer
//! ```
//!
//! - **api**: routes, bearer auth middleware, error envelope, OpenAPI document
//! - **services**: the certificate lifecycle, update schemas, provisioning
//! - **storage**: SQLite pool, migrations, repositories, list query grammar
//! - **jobs**: bounded in-process job queue with a worker pool

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod jobs;
pub mod observability;
pub mod services;
pub mod startup;
pub mod storage;

pub use config::AppConfig;
pub use errors::{CertplaneError, Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "certplane");
    }
}
