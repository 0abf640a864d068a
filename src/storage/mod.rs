//! # Storage and Persistence
//!
//! SQLite connectivity and the repositories behind the certificate
//! lifecycle: certificates, the hosts that reference them, and owners.

pub mod migrations;
pub mod pool;
pub mod query;
pub mod repositories;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use crate::config::DatabaseConfig;

pub use migrations::{applied_migration_versions, embedded_migration_versions, run_migrations};
pub use pool::{create_pool, DbPool};
pub use query::{ListQuery, Page, QueryError};
pub use repositories::{
    CertificateStore, DeleteOutcome, OwnerDirectory, ReferenceGuard, SqlxCertificateRepository,
    SqlxHostRepository, SqlxUserRepository, StatusUpdate,
};

use crate::errors::{CertplaneError, Result};

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| CertplaneError::Database {
        source: e,
        context: "Database connectivity check failed".to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_connection() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        check_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_database_url() {
        let config = DatabaseConfig { url: "invalid://url".to_string(), ..Default::default() };

        let result = create_pool(&config).await;
        assert!(result.is_err());
    }
}
