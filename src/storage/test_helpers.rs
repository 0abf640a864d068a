//! Shared fixtures for repository and service tests.
//!
//! Every [`TestDatabase`] is a private in-memory SQLite database with all
//! migrations applied. It disappears when the pool is dropped.

use crate::config::DatabaseConfig;
use crate::storage::{create_pool, DbPool, SqlxUserRepository};

pub struct TestDatabase {
    pub pool: DbPool,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let pool = create_pool(&DatabaseConfig::in_memory())
            .await
            .unwrap_or_else(|e| panic!("Failed to create in-memory test pool: {}", e));
        Self { pool }
    }
}

/// Insert a user named `name` and return its id.
pub async fn seed_user(pool: &DbPool, name: &str) -> i64 {
    SqlxUserRepository::new(pool.clone())
        .create(name, &format!("{}@example.com", name))
        .await
        .unwrap_or_else(|e| panic!("Failed to seed user '{}': {}", name, e))
        .id
}
