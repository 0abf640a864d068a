use axum::{routing::get, Json, Router};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::certificates::list_certificates_handler,
        crate::api::handlers::certificates::get_certificate_handler,
        crate::api::handlers::certificates::create_certificate_handler,
        crate::api::handlers::certificates::update_certificate_handler,
        crate::api::handlers::certificates::delete_certificate_handler
    ),
    components(
        schemas(
            crate::api::handlers::health::HealthResponse,
            crate::api::handlers::certificates::DeleteCertificateResponse,
            crate::api::error::ErrorBody,
            crate::domain::Certificate,
            crate::domain::CertificateType,
            crate::domain::CertificateStatus,
            crate::domain::NewCertificate,
            crate::domain::Owner,
            crate::services::SchemaErrorDetail
        )
    ),
    tags(
        (name = "health", description = "Service liveness"),
        (name = "certificates", description = "TLS certificate lifecycle")
    ),
    security(
        ("bearerAuth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build(),
            ),
        );
    }
}

pub fn docs_router() -> Router {
    Router::new().route("/api/v1/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_includes_certificate_contract() {
        let openapi = ApiDoc::openapi();

        let paths = &openapi.paths.paths;
        assert!(paths.contains_key("/api/v1/certificates"));
        assert!(paths.contains_key("/api/v1/certificates/{id}"));
        assert!(paths.contains_key("/health"));

        let schemas = openapi.components.as_ref().expect("components").schemas.clone();
        assert!(schemas.contains_key("Certificate"));
        assert!(schemas.contains_key("ErrorBody"));
        assert!(schemas.contains_key("SchemaErrorDetail"));
    }

    #[test]
    fn openapi_declares_bearer_security() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.expect("components");
        assert!(components.security_schemes.contains_key("bearerAuth"));
    }
}
