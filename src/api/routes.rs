use std::sync::Arc;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Request},
    middleware,
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::auth::{authenticate, TokenService};
use crate::config::ServerConfig;
use crate::services::CertificateService;

use super::{
    docs,
    handlers::{
        create_certificate_handler, delete_certificate_handler, get_certificate_handler,
        health_handler, list_certificates_handler, update_certificate_handler,
    },
};

#[derive(Clone)]
pub struct ApiState {
    pub certificates: Arc<CertificateService>,
}

pub fn build_router(
    certificates: Arc<CertificateService>,
    tokens: Arc<TokenService>,
    server: &ServerConfig,
) -> Router {
    let api_state = ApiState { certificates };

    let secured_api = Router::new()
        .route(
            "/api/v1/certificates",
            get(list_certificates_handler).post(create_certificate_handler),
        )
        .route(
            "/api/v1/certificates/{id}",
            get(get_certificate_handler)
                .put(update_certificate_handler)
                .delete(delete_certificate_handler),
        )
        .layer(middleware::from_fn_with_state(tokens, authenticate))
        .with_state(api_state);

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(docs::docs_router())
        .merge(secured_api)
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            crate::request_span!(request.method(), request.uri().path())
        }));

    match cors_layer(&server.cors_allowed_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS is enabled only when at least one valid origin is configured.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_disabled_without_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
        assert!(cors_layer(&["https://admin.example.com".to_string()]).is_some());
    }
}
