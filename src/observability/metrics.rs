//! # Metrics Collection
//!
//! Prometheus metrics for certificate operations and the provisioning queue.
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{CertplaneError, Result};
use ::tracing::info;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const CERTIFICATE_OPERATIONS_TOTAL: &str = "certplane_certificate_operations_total";
pub const CERTIFICATE_OPERATION_DURATION: &str = "certplane_certificate_operation_duration_seconds";
pub const JOBS_ENQUEUED_TOTAL: &str = "certplane_jobs_enqueued_total";
pub const JOBS_REJECTED_TOTAL: &str = "certplane_jobs_rejected_total";
pub const JOBS_COMPLETED_TOTAL: &str = "certplane_jobs_completed_total";
pub const JOB_DURATION: &str = "certplane_job_duration_seconds";
pub const JOB_QUEUE_DEPTH: &str = "certplane_job_queue_depth";
pub const DISPATCH_FAILURES_TOTAL: &str = "certplane_provisioning_dispatch_failures_total";

/// Metrics recorder that tracks application metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a certificate operation (`list`, `get`, `create`, `update`, `delete`)
    pub fn record_certificate_operation(&self, operation: &str, outcome: &str, duration: f64) {
        let labels = [("operation", operation.to_string()), ("outcome", outcome.to_string())];
        counter!(CERTIFICATE_OPERATIONS_TOTAL, &labels).increment(1);

        let duration_labels = [("operation", operation.to_string())];
        histogram!(CERTIFICATE_OPERATION_DURATION, &duration_labels).record(duration);
    }

    pub fn record_job_enqueued(&self, job: &str) {
        counter!(JOBS_ENQUEUED_TOTAL, "job" => job.to_string()).increment(1);
    }

    pub fn record_job_rejected(&self, job: &str, reason: &str) {
        let labels = [("job", job.to_string()), ("reason", reason.to_string())];
        counter!(JOBS_REJECTED_TOTAL, &labels).increment(1);
    }

    pub fn record_job_completed(&self, job: &str, success: bool, duration: f64) {
        let status = if success { "success" } else { "error" };
        let labels = [("job", job.to_string()), ("status", status.to_string())];
        counter!(JOBS_COMPLETED_TOTAL, &labels).increment(1);
        histogram!(JOB_DURATION, "job" => job.to_string()).record(duration);
    }

    pub fn update_job_queue_depth(&self, depth: usize) {
        gauge!(JOB_QUEUE_DEPTH).set(depth as f64);
    }

    pub fn record_dispatch_failure(&self, job: &str) {
        counter!(DISPATCH_FAILURES_TOTAL, "job" => job.to_string()).increment(1);
    }

    /// Register descriptions for every metric this crate emits
    pub fn register_metrics(&self) {
        describe_counter!(
            CERTIFICATE_OPERATIONS_TOTAL,
            Unit::Count,
            "Certificate API operations by operation and outcome"
        );
        describe_histogram!(
            CERTIFICATE_OPERATION_DURATION,
            Unit::Seconds,
            "Certificate operation latency"
        );
        describe_counter!(JOBS_ENQUEUED_TOTAL, Unit::Count, "Jobs accepted by the job queue");
        describe_counter!(JOBS_REJECTED_TOTAL, Unit::Count, "Jobs the job queue refused");
        describe_counter!(JOBS_COMPLETED_TOTAL, Unit::Count, "Jobs executed by workers");
        describe_histogram!(JOB_DURATION, Unit::Seconds, "Job execution time");
        describe_gauge!(JOB_QUEUE_DEPTH, Unit::Count, "Jobs waiting for a worker");
        describe_counter!(
            DISPATCH_FAILURES_TOTAL,
            Unit::Count,
            "Provisioning jobs that could not be dispatched"
        );

        gauge!(JOB_QUEUE_DEPTH).set(0.0);
    }
}

/// Initialize the Prometheus exporter on `observability.metrics_port`
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = config.metrics_bind_address();
    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        CertplaneError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            CertplaneError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    MetricsRecorder::new().register_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
