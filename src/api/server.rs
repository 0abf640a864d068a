use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::auth::TokenService;
use crate::config::ServerConfig;
use crate::errors::{CertplaneError, Result};
use crate::services::CertificateService;

use super::routes::build_router;

/// Serve the API until `shutdown` resolves.
pub async fn start_api_server<F>(
    config: &ServerConfig,
    certificates: Arc<CertificateService>,
    tokens: Arc<TokenService>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| CertplaneError::config(format!("Invalid API address: {}", e)))?;

    let router = build_router(certificates, tokens, config);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| CertplaneError::transport(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, "Starting HTTP API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| CertplaneError::transport(format!("API server error: {}", e)))?;

    info!("API server shutdown completed");
    Ok(())
}
