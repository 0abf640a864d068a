//! Certificate provisioning.
//!
//! The work a provisioning job performs for one certificate. Supplied
//! certificates are marked `provided` immediately; issued ones move through
//! `requesting` to `provided` or `failed` depending on the [`Issuer`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::domain::{Certificate, CertificateStatus};
use crate::errors::{CertplaneError, Result};
use crate::storage::{CertificateStore, StatusUpdate};

/// Result of a successful issuance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub expires_at: Option<DateTime<Utc>>,
}

/// Obtains certificate material from a certificate authority or local tool.
#[async_trait]
pub trait Issuer: Send + Sync {
    async fn issue(&self, certificate: &Certificate) -> Result<IssuedCertificate>;
}

/// Issuer used when no certificate authority is configured. Every request
/// fails, leaving the certificate `failed` with an explanatory message.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredIssuer;

#[async_trait]
impl Issuer for UnconfiguredIssuer {
    async fn issue(&self, certificate: &Certificate) -> Result<IssuedCertificate> {
        Err(CertplaneError::config(format!(
            "no issuer configured for {} certificates",
            certificate.certificate_type
        )))
    }
}

#[derive(Clone)]
pub struct CertificateProvisioner {
    store: Arc<dyn CertificateStore>,
    issuer: Arc<dyn Issuer>,
}

impl CertificateProvisioner {
    pub fn new(store: Arc<dyn CertificateStore>, issuer: Arc<dyn Issuer>) -> Self {
        Self { store, issuer }
    }

    /// Provision `certificate` and record the outcome on its row.
    ///
    /// A certificate deleted before the job runs is skipped.
    #[instrument(
        skip(self, certificate),
        fields(
            certificate_id = certificate.id,
            certificate_type = %certificate.certificate_type
        )
    )]
    pub async fn provision(&self, certificate: Certificate) -> Result<()> {
        if !certificate.certificate_type.is_issued() {
            return self
                .record(certificate.id, StatusUpdate::new(CertificateStatus::Provided))
                .await;
        }

        self.record(certificate.id, StatusUpdate::new(CertificateStatus::Requesting)).await?;

        match self.issuer.issue(&certificate).await {
            Ok(issued) => {
                info!(expires_at = ?issued.expires_at, "Certificate issued");
                self.record(
                    certificate.id,
                    StatusUpdate::new(CertificateStatus::Provided).with_expiry(issued.expires_at),
                )
                .await
            }
            Err(e) => {
                warn!(error = %e, "Certificate issuance failed");
                self.record(certificate.id, StatusUpdate::failed(e.to_string())).await?;
                Err(e)
            }
        }
    }

    async fn record(&self, id: i64, update: StatusUpdate) -> Result<()> {
        match self.store.update_status(id, &update).await {
            Err(CertplaneError::NotFound { .. }) => {
                debug!(certificate_id = id, "Certificate removed before provisioning finished");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CertificateType, NewCertificate};
    use crate::storage::test_helpers::{seed_user, TestDatabase};
    use crate::storage::SqlxCertificateRepository;
    use chrono::TimeZone;
    use serde_json::json;

    struct FixedIssuer(DateTime<Utc>);

    #[async_trait]
    impl Issuer for FixedIssuer {
        async fn issue(&self, _certificate: &Certificate) -> Result<IssuedCertificate> {
            Ok(IssuedCertificate { expires_at: Some(self.0) })
        }
    }

    async fn saved(
        repo: &SqlxCertificateRepository,
        owner: i64,
        certificate_type: CertificateType,
    ) -> Certificate {
        let mut certificate = NewCertificate {
            certificate_type,
            name: "prov".to_string(),
            domain_names: vec!["prov.example.com".to_string()],
            certificate_authority_id: Some(1),
            dns_provider_id: Some(1),
            meta: json!({}),
            is_ecc: false,
        }
        .into_certificate(owner);
        repo.save(&mut certificate).await.unwrap();
        certificate
    }

    #[tokio::test]
    async fn test_custom_certificate_is_provided_without_issuer() {
        let db = TestDatabase::new().await;
        let owner = seed_user(&db.pool, "alice").await;
        let repo = Arc::new(SqlxCertificateRepository::new(db.pool.clone()));
        let certificate = saved(&repo, owner, CertificateType::Custom).await;

        let provisioner = CertificateProvisioner::new(repo.clone(), Arc::new(UnconfiguredIssuer));
        provisioner.provision(certificate.clone()).await.unwrap();

        let loaded = repo.get_by_id(certificate.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CertificateStatus::Provided);
    }

    #[tokio::test]
    async fn test_issued_certificate_records_expiry() {
        let db = TestDatabase::new().await;
        let owner = seed_user(&db.pool, "alice").await;
        let repo = Arc::new(SqlxCertificateRepository::new(db.pool.clone()));
        let certificate = saved(&repo, owner, CertificateType::Http).await;
        let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        let provisioner =
            CertificateProvisioner::new(repo.clone(), Arc::new(FixedIssuer(expires_at)));
        provisioner.provision(certificate.clone()).await.unwrap();

        let loaded = repo.get_by_id(certificate.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CertificateStatus::Provided);
        assert_eq!(loaded.expires_at, Some(expires_at));
    }

    #[tokio::test]
    async fn test_issuer_failure_marks_failed() {
        let db = TestDatabase::new().await;
        let owner = seed_user(&db.pool, "alice").await;
        let repo = Arc::new(SqlxCertificateRepository::new(db.pool.clone()));
        let certificate = saved(&repo, owner, CertificateType::Dns).await;

        let provisioner = CertificateProvisioner::new(repo.clone(), Arc::new(UnconfiguredIssuer));
        assert!(provisioner.provision(certificate.clone()).await.is_err());

        let loaded = repo.get_by_id(certificate.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CertificateStatus::Failed);
        assert!(loaded.error_message.contains("no issuer configured"));
    }

    #[tokio::test]
    async fn test_deleted_certificate_is_skipped() {
        let db = TestDatabase::new().await;
        let owner = seed_user(&db.pool, "alice").await;
        let repo = Arc::new(SqlxCertificateRepository::new(db.pool.clone()));
        let certificate = saved(&repo, owner, CertificateType::Custom).await;
        repo.delete_if_unreferenced(certificate.id).await.unwrap();

        let provisioner = CertificateProvisioner::new(repo.clone(), Arc::new(UnconfiguredIssuer));
        assert!(provisioner.provision(certificate).await.is_ok());
    }
}
