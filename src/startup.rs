//! Server startup and shutdown sequence.
//!
//! Builds the pool, the provisioning queue and the certificate service, then
//! serves the API until ctrl-c. Queued provisioning jobs are drained before
//! returning.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::start_api_server;
use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::jobs::{InProcessJobQueue, JobQueue};
use crate::observability::log_config_info;
use crate::services::{CertificateService, Issuer, UnconfiguredIssuer};
use crate::storage::{check_connection, create_pool};

/// Run the API server with the default (unconfigured) issuer.
pub async fn run_server(config: AppConfig) -> Result<()> {
    run_server_with_issuer(config, Arc::new(UnconfiguredIssuer)).await
}

pub async fn run_server_with_issuer(config: AppConfig, issuer: Arc<dyn Issuer>) -> Result<()> {
    log_config_info(&config);

    let pool = create_pool(&config.database).await?;
    check_connection(&pool).await?;

    let (queue, queue_handle) = InProcessJobQueue::start(&config.provisioning);
    let queue: Arc<dyn JobQueue> = Arc::new(queue);

    let certificates = Arc::new(CertificateService::sqlite(pool.clone(), queue, issuer));
    let tokens = Arc::new(TokenService::new(&config.auth));

    let served =
        start_api_server(&config.server, certificates, tokens, shutdown_signal()).await;

    info!("Draining provisioning queue");
    queue_handle.shutdown_and_join().await;
    pool.close().await;

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "API server shutdown listener failed");
    }
    info!("Shutdown signal received");
}
