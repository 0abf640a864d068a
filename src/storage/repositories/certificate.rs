//! Certificate repository.
//!
//! Persistence boundary for certificate records. Besides plain CRUD it owns
//! the one write that must be atomic with respect to hosts: deleting a
//! certificate only while no host references it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::instrument;

use crate::domain::{Certificate, CertificateStatus, CertificateType};
use crate::errors::{CertplaneError, Result};
use crate::storage::query::{Filter, FilterField, FilterModifier, FilterValue, ListQuery, Page};
use crate::storage::DbPool;

// ============================================================================
// Data Types
// ============================================================================

/// Result of a guarded delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row was removed
    Deleted,
    /// No row with that id exists
    NotFound,
    /// At least one host references the certificate, nothing was removed
    InUse,
}

/// Provisioning state written back by provisioning jobs
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: CertificateStatus,
    pub error_message: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn new(status: CertificateStatus) -> Self {
        Self { status, error_message: String::new(), expires_at: None }
    }

    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self {
            status: CertificateStatus::Failed,
            error_message: message.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }
}

// ============================================================================
// Database Row Type
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct CertificateRow {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    certificate_type: String,
    owner_id: i64,
    certificate_authority_id: Option<i64>,
    dns_provider_id: Option<i64>,
    name: String,
    domain_names: String,
    status: String,
    error_message: String,
    meta: String,
    is_ecc: bool,
}

impl TryFrom<CertificateRow> for Certificate {
    type Error = CertplaneError;

    fn try_from(row: CertificateRow) -> Result<Self> {
        let certificate_type = row
            .certificate_type
            .parse::<CertificateType>()
            .map_err(|e| {
                CertplaneError::internal(format!("Corrupt certificate row {}: {}", row.id, e))
            })?;
        let status = row
            .status
            .parse::<CertificateStatus>()
            .map_err(|e| {
                CertplaneError::internal(format!("Corrupt certificate row {}: {}", row.id, e))
            })?;

        Ok(Certificate {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
            certificate_type,
            owner_id: row.owner_id,
            certificate_authority_id: row.certificate_authority_id,
            dns_provider_id: row.dns_provider_id,
            name: row.name,
            domain_names: serde_json::from_str(&row.domain_names)?,
            status,
            error_message: row.error_message,
            meta: serde_json::from_str(&row.meta)?,
            is_ecc: row.is_ecc,
            owner: None,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, created_at, updated_at, expires_at, certificate_type, \
     owner_id, certificate_authority_id, dns_provider_id, name, domain_names, status, \
     error_message, meta, is_ecc FROM certificates";

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// One page of certificates matching the query, in the query's sort order.
    async fn list(&self, query: &ListQuery) -> Result<Page<Certificate>>;

    /// Get a certificate by ID.
    async fn get_by_id(&self, id: i64) -> Result<Option<Certificate>>;

    /// Insert (`id == 0`) or update (`id > 0`) a certificate.
    ///
    /// On insert the assigned id and timestamps are written back into
    /// `certificate`. An update leaves the provisioning state untouched and
    /// refreshes it in `certificate`. Rejections are reported as validation
    /// errors.
    async fn save(&self, certificate: &mut Certificate) -> Result<()>;

    /// Record the outcome of a provisioning attempt.
    async fn update_status(&self, id: i64, update: &StatusUpdate) -> Result<()>;

    /// Delete a certificate unless a host references it, as one atomic step.
    async fn delete_if_unreferenced(&self, id: i64) -> Result<DeleteOutcome>;
}

// ============================================================================
// SQLx Implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqlxCertificateRepository {
    pool: DbPool,
}

impl SqlxCertificateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, certificate: &mut Certificate) -> Result<()> {
        let now = Utc::now();

        let (id, created_at, updated_at): (i64, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO certificates (
                created_at, updated_at, expires_at, certificate_type, owner_id,
                certificate_authority_id, dns_provider_id, name, domain_names,
                status, error_message, meta, is_ecc
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(certificate.expires_at)
        .bind(certificate.certificate_type.as_str())
        .bind(certificate.owner_id)
        .bind(certificate.certificate_authority_id)
        .bind(certificate.dns_provider_id)
        .bind(&certificate.name)
        .bind(serde_json::to_string(&certificate.domain_names)?)
        .bind(certificate.status.as_str())
        .bind(&certificate.error_message)
        .bind(serde_json::to_string(&certificate.meta)?)
        .bind(certificate.is_ecc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to create certificate"))?;

        certificate.id = id;
        certificate.created_at = created_at;
        certificate.updated_at = updated_at;
        Ok(())
    }

    /// Provisioning columns are owned by `update_status`; they are read back,
    /// never written, so a job finishing mid-update keeps its result.
    async fn update(&self, certificate: &mut Certificate) -> Result<()> {
        let now = Utc::now();

        let row: Option<(String, String, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            UPDATE certificates SET
                updated_at = $1, certificate_authority_id = $2, dns_provider_id = $3,
                name = $4, domain_names = $5, meta = $6, is_ecc = $7
            WHERE id = $8
            RETURNING status, error_message, expires_at
            "#,
        )
        .bind(now)
        .bind(certificate.certificate_authority_id)
        .bind(certificate.dns_provider_id)
        .bind(&certificate.name)
        .bind(serde_json::to_string(&certificate.domain_names)?)
        .bind(serde_json::to_string(&certificate.meta)?)
        .bind(certificate.is_ecc)
        .bind(certificate.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, format!("Failed to update certificate {}", certificate.id)))?;

        let Some((status, error_message, expires_at)) = row else {
            return Err(CertplaneError::not_found("certificate", certificate.id.to_string()));
        };

        certificate.status = status.parse::<CertificateStatus>().map_err(|e| {
            CertplaneError::internal(format!("Corrupt certificate row {}: {}", certificate.id, e))
        })?;
        certificate.error_message = error_message;
        certificate.expires_at = expires_at;
        certificate.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl CertificateStore for SqlxCertificateRepository {
    #[instrument(
        skip(self, query),
        fields(offset = query.offset, limit = query.limit, filters = query.filters.len()),
        name = "db_list_certificates"
    )]
    async fn list(&self, query: &ListQuery) -> Result<Page<Certificate>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM certificates");
        push_filters(&mut count, &query.filters);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CertplaneError::database(e, "Failed to count certificates"))?;

        let mut select = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_filters(&mut select, &query.filters);
        select.push(" ORDER BY ");
        for sort in &query.sort {
            select.push(sort.field.column()).push(" ").push(sort.direction.as_sql()).push(", ");
        }
        // id breaks ties so pages never overlap
        select.push("id ASC");
        select.push(" LIMIT ").push_bind(query.limit);
        select.push(" OFFSET ").push_bind(query.offset);

        let rows = select
            .build_query_as::<CertificateRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CertplaneError::database(e, "Failed to list certificates"))?;

        let items = rows.into_iter().map(Certificate::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page { items, total })
    }

    #[instrument(skip(self), name = "db_get_certificate_by_id")]
    async fn get_by_id(&self, id: i64) -> Result<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                CertplaneError::database(e, format!("Failed to fetch certificate by ID: {}", id))
            })?;

        row.map(Certificate::try_from).transpose()
    }

    #[instrument(
        skip(self, certificate),
        fields(id = certificate.id, certificate_type = %certificate.certificate_type),
        name = "db_save_certificate"
    )]
    async fn save(&self, certificate: &mut Certificate) -> Result<()> {
        certificate.validate_for_save()?;

        if certificate.is_persisted() {
            self.update(certificate).await
        } else {
            self.insert(certificate).await
        }
    }

    #[instrument(
        skip(self, update),
        fields(status = %update.status),
        name = "db_update_certificate_status"
    )]
    async fn update_status(&self, id: i64, update: &StatusUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE certificates SET status = $1, error_message = $2, \
             expires_at = COALESCE($3, expires_at), updated_at = $4 WHERE id = $5",
        )
        .bind(update.status.as_str())
        .bind(&update.error_message)
        .bind(update.expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CertplaneError::database(e, format!("Failed to update status of certificate {}", id))
        })?;

        if result.rows_affected() == 0 {
            return Err(CertplaneError::not_found("certificate", id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_certificate_if_unreferenced")]
    async fn delete_if_unreferenced(&self, id: i64) -> Result<DeleteOutcome> {
        let result = sqlx::query(
            "DELETE FROM certificates WHERE id = $1 \
             AND NOT EXISTS (SELECT 1 FROM hosts WHERE certificate_id = $2)",
        )
        .bind(id)
        .bind(id)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            // A host inserted concurrently still trips ON DELETE RESTRICT.
            Err(e) if is_foreign_key_violation(&e) => return Ok(DeleteOutcome::InUse),
            Err(e) => {
                return Err(CertplaneError::database(
                    e,
                    format!("Failed to delete certificate {}", id),
                ))
            }
        };

        if result.rows_affected() > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM certificates WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    CertplaneError::database(e, format!("Failed to check certificate {}", id))
                })?;

        Ok(if exists { DeleteOutcome::InUse } else { DeleteOutcome::NotFound })
    }
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    error.as_database_error().is_some_and(|db_err| db_err.is_foreign_key_violation())
}

/// Map a failed write to a validation error when the database rejected the row.
fn write_error<S: Into<String>>(error: sqlx::Error, context: S) -> CertplaneError {
    let context = context.into();
    if is_foreign_key_violation(&error) {
        return CertplaneError::validation_field("owner does not exist", "ownerId");
    }
    let wrapped = CertplaneError::database(error, context);
    if wrapped.is_constraint_violation() {
        if let CertplaneError::Database { source, context } = &wrapped {
            return CertplaneError::validation(format!("{}: {}", context, source));
        }
    }
    wrapped
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &[Filter]) {
    for (index, filter) in filters.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        if filter.field == FilterField::DomainNames {
            push_domain_names_filter(builder, filter);
        } else {
            push_column_filter(builder, filter.field.column(), filter);
        }
    }
}

fn push_column_filter(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, filter: &Filter) {
    match filter.modifier {
        FilterModifier::In | FilterModifier::NotIn => {
            builder.push(column);
            builder.push(if filter.modifier == FilterModifier::In { " IN (" } else { " NOT IN (" });
            let mut separated = builder.separated(", ");
            for value in &filter.values {
                push_value(&mut separated, value);
            }
            separated.push_unseparated(")");
        }
        FilterModifier::Contains | FilterModifier::Starts | FilterModifier::Ends => {
            builder.push(column).push(" LIKE ");
            builder.push_bind(like_pattern(filter.modifier, first_text(filter)));
            builder.push(" ESCAPE '\\'");
        }
        modifier => {
            let operator = match modifier {
                FilterModifier::Not => " <> ",
                FilterModifier::Gt => " > ",
                FilterModifier::Gte => " >= ",
                FilterModifier::Lt => " < ",
                FilterModifier::Lte => " <= ",
                _ => " = ",
            };
            builder.push(column).push(operator);
            if let Some(value) = filter.values.first() {
                match value {
                    FilterValue::Integer(v) => builder.push_bind(*v),
                    FilterValue::Text(v) => builder.push_bind(v.clone()),
                };
            }
        }
    }
}

/// Domain names are stored as a JSON array; match against its elements.
fn push_domain_names_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    let negated = matches!(filter.modifier, FilterModifier::Not | FilterModifier::NotIn);
    builder.push(if negated { "NOT EXISTS" } else { "EXISTS" });
    builder.push(" (SELECT 1 FROM json_each(certificates.domain_names) WHERE ");

    let element = Filter {
        field: filter.field,
        modifier: match filter.modifier {
            FilterModifier::Not => FilterModifier::Equals,
            FilterModifier::NotIn => FilterModifier::In,
            other => other,
        },
        values: filter.values.clone(),
    };
    push_column_filter(builder, "json_each.value", &element);
    builder.push(")");
}

fn push_value(
    separated: &mut sqlx::query_builder::Separated<'_, '_, Sqlite, &str>,
    value: &FilterValue,
) {
    match value {
        FilterValue::Integer(v) => separated.push_bind(*v),
        FilterValue::Text(v) => separated.push_bind(v.clone()),
    };
}

fn first_text(filter: &Filter) -> &str {
    match filter.values.first() {
        Some(FilterValue::Text(v)) => v,
        _ => "",
    }
}

fn like_pattern(modifier: FilterModifier, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    match modifier {
        FilterModifier::Starts => format!("{}%", escaped),
        FilterModifier::Ends => format!("%{}", escaped),
        _ => format!("%{}%", escaped),
    }
}
