//! User repository
//!
//! Users are provisioned outside the certificate API (see `certplane
//! create-user`). Certificates reference them through `owner_id`; the only
//! read path the API needs is the owner lookup behind the `owner` expansion.

use crate::domain::Owner;
use crate::errors::{CertplaneError, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct OwnerRow {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<OwnerRow> for Owner {
    fn from(row: OwnerRow) -> Self {
        Owner { id: row.id, name: row.name, email: row.email }
    }
}

/// Read access to certificate owners
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// Get the owner with this user id, if any
    async fn get_owner(&self, id: i64) -> Result<Option<Owner>>;
}

#[derive(Debug, Clone)]
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a user. Emails are unique.
    #[instrument(skip(self), name = "db_create_user")]
    pub async fn create(&self, name: &str, email: &str) -> Result<Owner> {
        let row = sqlx::query_as::<_, OwnerRow>(
            "INSERT INTO users (name, email, created_at) VALUES ($1, $2, $3) \
             RETURNING id, name, email",
        )
        .bind(name)
        .bind(email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db_err| db_err.is_unique_violation()) {
                CertplaneError::conflict(
                    format!("User with email '{}' already exists", email),
                    "user",
                )
            } else {
                CertplaneError::database(e, format!("Failed to create user '{}'", email))
            }
        })?;

        Ok(row.into())
    }
}

#[async_trait]
impl OwnerDirectory for SqlxUserRepository {
    #[instrument(skip(self), name = "db_get_owner")]
    async fn get_owner(&self, id: i64) -> Result<Option<Owner>> {
        let row = sqlx::query_as::<_, OwnerRow>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CertplaneError::database(e, format!("Failed to fetch user {}", id)))?;

        Ok(row.map(Owner::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::TestDatabase;

    #[tokio::test]
    async fn test_create_and_get_owner() {
        let db = TestDatabase::new().await;
        let repo = SqlxUserRepository::new(db.pool.clone());

        let created = repo.create("Alice", "alice@example.com").await.unwrap();
        assert!(created.id > 0);

        let owner = repo.get_owner(created.id).await.unwrap().expect("owner exists");
        assert_eq!(owner, created);
        assert!(repo.get_owner(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let db = TestDatabase::new().await;
        let repo = SqlxUserRepository::new(db.pool.clone());

        repo.create("Alice", "alice@example.com").await.unwrap();
        let err = repo.create("Alicia", "alice@example.com").await.unwrap_err();
        assert!(matches!(err, CertplaneError::Conflict { .. }));
    }
}
