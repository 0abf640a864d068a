//! Host repository
//!
//! Hosts belong to the proxy configuration. This service reads them for one
//! purpose: knowing whether a certificate is still referenced.

use crate::domain::Host;
use crate::errors::{CertplaneError, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct HostRow {
    pub id: i64,
    pub domain_names: String,
    pub certificate_id: Option<i64>,
}

impl TryFrom<HostRow> for Host {
    type Error = CertplaneError;

    fn try_from(row: HostRow) -> Result<Self> {
        Ok(Host {
            id: row.id,
            domain_names: serde_json::from_str(&row.domain_names)?,
            certificate_id: row.certificate_id,
        })
    }
}

/// Counts references from hosts to a certificate
#[async_trait]
pub trait ReferenceGuard: Send + Sync {
    /// Number of hosts whose `certificate_id` is `certificate_id`
    async fn certificate_use_count(&self, certificate_id: i64) -> Result<i64>;
}

#[derive(Debug, Clone)]
pub struct SqlxHostRepository {
    pool: DbPool,
}

impl SqlxHostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a host, optionally pointing at a certificate.
    #[instrument(skip(self), name = "db_create_host")]
    pub async fn create(
        &self,
        domain_names: &[String],
        certificate_id: Option<i64>,
    ) -> Result<Host> {
        let row = sqlx::query_as::<_, HostRow>(
            "INSERT INTO hosts (domain_names, certificate_id, created_at) VALUES ($1, $2, $3) \
             RETURNING id, domain_names, certificate_id",
        )
        .bind(serde_json::to_string(domain_names)?)
        .bind(certificate_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db_err| db_err.is_foreign_key_violation()) {
                CertplaneError::validation_field("certificate does not exist", "certificateId")
            } else {
                CertplaneError::database(e, "Failed to create host")
            }
        })?;

        Host::try_from(row)
    }
}

#[async_trait]
impl ReferenceGuard for SqlxHostRepository {
    #[instrument(skip(self), name = "db_certificate_use_count")]
    async fn certificate_use_count(&self, certificate_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM hosts WHERE certificate_id = $1")
            .bind(certificate_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                CertplaneError::database(
                    e,
                    format!("Failed to count hosts using certificate {}", certificate_id),
                )
            })
    }
}
