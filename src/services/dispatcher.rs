//! Provisioning dispatch.
//!
//! Binds a provisioning run to one certificate and hands it to the job
//! queue. Dispatch never fails from the caller's point of view: rejected jobs
//! are reported to a [`DispatchObserver`] and dropped.

use std::sync::Arc;

use tracing::{debug, error};

use super::provisioner::CertificateProvisioner;
use crate::domain::Certificate;
use crate::jobs::{Job, JobQueue, JobQueueError};
use crate::observability::MetricsRecorder;

pub const REQUEST_CERTIFICATE_JOB: &str = "RequestCertificate";

/// Receives dispatch failures
pub trait DispatchObserver: Send + Sync {
    fn dispatch_failed(&self, job: &str, certificate_id: i64, error: &JobQueueError);
}

/// Logs dispatch failures and counts them
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    metrics: MetricsRecorder,
}

impl DispatchObserver for TracingObserver {
    fn dispatch_failed(&self, job: &str, certificate_id: i64, error: &JobQueueError) {
        error!(job, certificate_id, error = %error, "Failed to dispatch provisioning job");
        self.metrics.record_dispatch_failure(job);
    }
}

#[derive(Clone)]
pub struct ProvisioningDispatcher {
    queue: Arc<dyn JobQueue>,
    provisioner: CertificateProvisioner,
    observer: Arc<dyn DispatchObserver>,
}

impl ProvisioningDispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        provisioner: CertificateProvisioner,
        observer: Arc<dyn DispatchObserver>,
    ) -> Self {
        Self { queue, provisioner, observer }
    }

    /// Enqueue a provisioning job for this certificate and return at once.
    pub fn dispatch(&self, certificate: &Certificate) {
        let provisioner = self.provisioner.clone();
        let bound = certificate.clone();
        let certificate_id = certificate.id;

        let job =
            Job::new(REQUEST_CERTIFICATE_JOB, async move { provisioner.provision(bound).await });

        match self.queue.enqueue(job) {
            Ok(()) => {
                debug!(certificate_id, job = REQUEST_CERTIFICATE_JOB, "Provisioning job enqueued")
            }
            Err(e) => self.observer.dispatch_failed(REQUEST_CERTIFICATE_JOB, certificate_id, &e),
        }
    }
}
