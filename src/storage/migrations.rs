//! # Database Migration Management
//!
//! SQL migrations under `migrations/` are embedded into the binary at compile
//! time and applied on startup when `database.auto_migrate` is enabled, or on
//! demand with `certplane migrate`.

use crate::errors::{CertplaneError, Result};
use crate::storage::DbPool;
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!(available = MIGRATOR.iter().count(), "Starting database migration process");
    MIGRATOR.run(pool).await?;
    info!("Database migrations complete");
    Ok(())
}

/// Versions of the migrations recorded as applied, oldest first
pub async fn applied_migration_versions(pool: &DbPool) -> Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>(
        "SELECT version FROM _sqlx_migrations WHERE success = TRUE ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| CertplaneError::database(e, "Failed to read applied migrations"))
}

/// Versions of every migration embedded in this binary, oldest first
pub fn embedded_migration_versions() -> Vec<i64> {
    MIGRATOR.iter().map(|m| m.version).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::create_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let applied = applied_migration_versions(&pool).await.unwrap();
        assert_eq!(applied, embedded_migration_versions());
        assert!(!applied.is_empty());
    }
}
