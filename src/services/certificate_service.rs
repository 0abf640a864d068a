//! Certificate lifecycle service
//!
//! Orchestrates list, get, create, update and delete over the certificate
//! store, the host reference guard, the per-type update schemas and the
//! provisioning dispatcher. HTTP concerns stay in `api`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::dispatcher::{ProvisioningDispatcher, TracingObserver};
use super::provisioner::{CertificateProvisioner, Issuer};
use super::schema::{CertificateSchemaValidator, SchemaErrorDetail, SchemaFatal};
use crate::domain::{Certificate, CertificateType, Expansion, ExpansionSet, NewCertificate, Owner};
use crate::errors::CertplaneError;
use crate::jobs::JobQueue;
use crate::observability::MetricsRecorder;
use crate::storage::{
    CertificateStore, DbPool, DeleteOutcome, ListQuery, OwnerDirectory, Page, QueryError,
    ReferenceGuard, SqlxCertificateRepository, SqlxHostRepository, SqlxUserRepository,
};

/// Failures of certificate operations, one per client-visible outcome
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("Certificate {0} not found")]
    NotFound(i64),

    #[error("Persistence failure: {0}")]
    Persistence(#[source] CertplaneError),

    #[error("{message}")]
    Validation { message: String, field: Option<String> },

    #[error("Payload does not match the {certificate_type} certificate update schema")]
    SchemaErrors { certificate_type: CertificateType, errors: Vec<SchemaErrorDetail> },

    #[error(transparent)]
    SchemaFatal(#[from] SchemaFatal),

    #[error("Certificate {0} is in use by one or more hosts")]
    Conflict(i64),
}

impl CertificateError {
    /// Stable machine-readable name of the failure
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::InvalidQuery(_) => "invalid_query",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence_error",
            Self::Validation { .. } => "validation_error",
            Self::SchemaErrors { .. } => "schema_validation_failed",
            Self::SchemaFatal(_) => "schema_fatal",
            Self::Conflict(_) => "conflict",
        }
    }

    /// Rejections by the store on save. Anything but a vanished row is
    /// reported as a validation failure carrying the store's reason.
    fn from_save(id: i64, error: CertplaneError) -> Self {
        match error {
            CertplaneError::Validation { message, field } => Self::Validation { message, field },
            CertplaneError::NotFound { .. } => Self::NotFound(id),
            other => Self::Validation { message: other.to_string(), field: None },
        }
    }
}

/// A page of certificates together with the query that produced it
#[derive(Debug, Clone)]
pub struct CertificateListing {
    pub page: Page<Certificate>,
    pub query: ListQuery,
}

pub struct CertificateService {
    store: Arc<dyn CertificateStore>,
    guard: Arc<dyn ReferenceGuard>,
    owners: Arc<dyn OwnerDirectory>,
    validator: CertificateSchemaValidator,
    dispatcher: ProvisioningDispatcher,
    metrics: MetricsRecorder,
}

impl CertificateService {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        guard: Arc<dyn ReferenceGuard>,
        owners: Arc<dyn OwnerDirectory>,
        dispatcher: ProvisioningDispatcher,
    ) -> Self {
        Self {
            store,
            guard,
            owners,
            validator: CertificateSchemaValidator::new(),
            dispatcher,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Wire the service against the SQLite repositories.
    pub fn sqlite(pool: DbPool, queue: Arc<dyn JobQueue>, issuer: Arc<dyn Issuer>) -> Self {
        let store: Arc<dyn CertificateStore> =
            Arc::new(SqlxCertificateRepository::new(pool.clone()));
        let dispatcher = ProvisioningDispatcher::new(
            queue,
            CertificateProvisioner::new(Arc::clone(&store), issuer),
            Arc::new(TracingObserver::default()),
        );

        Self::new(
            store,
            Arc::new(SqlxHostRepository::new(pool.clone())),
            Arc::new(SqlxUserRepository::new(pool)),
            dispatcher,
        )
    }

    pub fn with_validator(mut self, validator: CertificateSchemaValidator) -> Self {
        self.validator = validator;
        self
    }

    /// List certificates for a raw (percent-encoded) query string.
    #[instrument(skip(self))]
    pub async fn list(&self, raw_query: &str) -> Result<CertificateListing, CertificateError> {
        let started = Instant::now();
        let result = self.list_inner(raw_query).await;
        self.observe("list", started, &result);
        result
    }

    async fn list_inner(&self, raw_query: &str) -> Result<CertificateListing, CertificateError> {
        let query = ListQuery::parse(raw_query)?;
        let mut page = self.store.list(&query).await.map_err(CertificateError::Persistence)?;
        self.apply_expansions(&mut page.items, &query.expand).await;
        Ok(CertificateListing { page, query })
    }

    #[instrument(skip(self, expand), fields(certificate_id = id))]
    pub async fn get(
        &self,
        id: i64,
        expand: &ExpansionSet,
    ) -> Result<Certificate, CertificateError> {
        let started = Instant::now();
        let result = async {
            let mut certificate = self.load(id).await?;
            self.apply_expansions(std::slice::from_mut(&mut certificate), expand).await;
            Ok::<_, CertificateError>(certificate)
        }
        .await;
        self.observe("get", started, &result);
        result
    }

    /// Create a certificate owned by `caller_id` and start provisioning it.
    #[instrument(skip(self, payload), fields(certificate_id = tracing::field::Empty))]
    pub async fn create(
        &self,
        payload: &[u8],
        caller_id: i64,
    ) -> Result<Certificate, CertificateError> {
        let started = Instant::now();
        let result = self.create_inner(payload, caller_id).await;
        self.observe("create", started, &result);
        result
    }

    async fn create_inner(
        &self,
        payload: &[u8],
        caller_id: i64,
    ) -> Result<Certificate, CertificateError> {
        let new: NewCertificate = serde_json::from_slice(payload)
            .map_err(|e| CertificateError::InvalidPayload(e.to_string()))?;

        let mut certificate = new.into_certificate(caller_id);
        self.store
            .save(&mut certificate)
            .await
            .map_err(|e| CertificateError::from_save(certificate.id, e))?;

        tracing::Span::current().record("certificate_id", certificate.id);
        info!(
            certificate_id = certificate.id,
            certificate_type = %certificate.certificate_type,
            owner_id = caller_id,
            "Certificate created"
        );

        self.dispatcher.dispatch(&certificate);
        Ok(certificate)
    }

    /// Apply a partial update, validated against the stored type's schema.
    #[instrument(skip(self, payload), fields(certificate_id = id))]
    pub async fn update(&self, id: i64, payload: &[u8]) -> Result<Certificate, CertificateError> {
        let started = Instant::now();
        let result = self.update_inner(id, payload).await;
        self.observe("update", started, &result);
        result
    }

    async fn update_inner(&self, id: i64, payload: &[u8]) -> Result<Certificate, CertificateError> {
        let existing = self.load(id).await?;

        let patch: Value = serde_json::from_slice(payload)
            .map_err(|e| CertificateError::InvalidPayload(e.to_string()))?;

        let certificate_type = existing.certificate_type;
        let errors = self.validator.validate(certificate_type, &patch)?;
        if !errors.is_empty() {
            return Err(CertificateError::SchemaErrors { certificate_type, errors });
        }

        let fields = patch.as_object().ok_or_else(|| {
            CertificateError::InvalidPayload("update payload must be a JSON object".to_string())
        })?;
        let mut updated = merge_update(&existing, fields)?;

        self.store.save(&mut updated).await.map_err(|e| CertificateError::from_save(id, e))?;

        info!(certificate_id = id, changed_fields = fields.len(), "Certificate updated");

        self.dispatcher.dispatch(&updated);
        Ok(updated)
    }

    /// Delete a certificate that no host references.
    #[instrument(skip(self), fields(certificate_id = id))]
    pub async fn delete(&self, id: i64) -> Result<(), CertificateError> {
        let started = Instant::now();
        let result = self.delete_inner(id).await;
        self.observe("delete", started, &result);
        result
    }

    async fn delete_inner(&self, id: i64) -> Result<(), CertificateError> {
        self.load(id).await?;

        let hosts =
            self.guard.certificate_use_count(id).await.map_err(CertificateError::Persistence)?;
        if hosts > 0 {
            info!(certificate_id = id, hosts, "Refusing to delete certificate in use");
            return Err(CertificateError::Conflict(id));
        }

        match self.store.delete_if_unreferenced(id).await.map_err(CertificateError::Persistence)? {
            DeleteOutcome::Deleted => {
                info!(certificate_id = id, "Certificate deleted");
                Ok(())
            }
            DeleteOutcome::InUse => Err(CertificateError::Conflict(id)),
            DeleteOutcome::NotFound => Err(CertificateError::NotFound(id)),
        }
    }

    async fn load(&self, id: i64) -> Result<Certificate, CertificateError> {
        self.store
            .get_by_id(id)
            .await
            .map_err(CertificateError::Persistence)?
            .ok_or(CertificateError::NotFound(id))
    }

    /// Attach requested relations. Lookup failures leave the relation unset.
    async fn apply_expansions(&self, certificates: &mut [Certificate], expand: &ExpansionSet) {
        if !expand.contains(Expansion::Owner) {
            return;
        }

        let mut owners: HashMap<i64, Option<Owner>> = HashMap::new();
        for certificate in certificates.iter_mut() {
            if !owners.contains_key(&certificate.owner_id) {
                let owner = match self.owners.get_owner(certificate.owner_id).await {
                    Ok(owner) => owner,
                    Err(e) => {
                        warn!(
                            owner_id = certificate.owner_id,
                            error = %e,
                            "Owner expansion failed"
                        );
                        None
                    }
                };
                owners.insert(certificate.owner_id, owner);
            }
            certificate.owner = owners.get(&certificate.owner_id).cloned().flatten();
        }
    }

    fn observe<T>(&self, operation: &str, started: Instant, result: &Result<T, CertificateError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.metrics.record_certificate_operation(
            operation,
            outcome,
            started.elapsed().as_secs_f64(),
        );
    }
}

/// Overlay `fields` on `existing`. Identity and type always keep their
/// stored values.
fn merge_update(
    existing: &Certificate,
    fields: &Map<String, Value>,
) -> Result<Certificate, CertificateError> {
    let mut merged = serde_json::to_value(existing)
        .map_err(|e| CertificateError::Persistence(CertplaneError::from(e)))?;

    if let Value::Object(target) = &mut merged {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }

    let mut updated: Certificate = serde_json::from_value(merged)
        .map_err(|e| CertificateError::InvalidPayload(e.to_string()))?;
    updated.id = existing.id;
    updated.owner_id = existing.owner_id;
    updated.certificate_type = existing.certificate_type;
    updated.owner = None;
    Ok(updated)
}
