//! Certificate endpoints
//!
//! Handlers stay thin: bodies are passed to the service as raw bytes so that
//! payload and schema failures are reported by the service, not by an axum
//! extractor rejection.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

#[allow(unused_imports)]
use crate::api::error::{ApiError, ErrorBody};
use crate::api::handlers::pagination::PaginatedResponse;
use crate::api::routes::ApiState;
use crate::auth::AuthContext;
#[allow(unused_imports)]
use crate::domain::{Certificate, ExpansionSet, NewCertificate};

/// Confirmation returned by a successful delete
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteCertificateResponse {
    #[schema(example = true)]
    pub deleted: bool,
}

pub type CertificateListResponse = PaginatedResponse<Certificate>;

/// Certificate ids are positive integers; anything else is a client error.
fn parse_certificate_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid certificate id '{}'", raw)))
}

fn expansions_from_query(raw: Option<&str>) -> ExpansionSet {
    let requested: Vec<String> = raw
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| key == "expand")
                .map(|(_, value)| value.into_owned())
                .collect()
        })
        .unwrap_or_default();
    ExpansionSet::parse(&requested.join(","))
}

#[utoipa::path(
    get,
    path = "/api/v1/certificates",
    params(
        ("offset" = Option<i64>, Query, description = "Number of certificates to skip"),
        ("limit" = Option<i64>, Query, description = "Page size, 1 to 1000 (default 50)"),
        ("sort" = Option<String>, Query, description = "Sort fields, e.g. `name.asc,id.desc`"),
        ("expand" = Option<String>, Query, description = "Relations to attach, e.g. `owner`"),
    ),
    responses(
        (status = 200, description = "Page of certificates", body = PaginatedResponse<Certificate>),
        (status = 400, description = "Malformed query or store failure", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
    ),
    tag = "certificates"
)]
#[instrument(skip(state, raw_query), fields(query = raw_query.as_deref().unwrap_or("")))]
pub async fn list_certificates_handler(
    State(state): State<ApiState>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<CertificateListResponse>, ApiError> {
    let listing = state.certificates.list(raw_query.as_deref().unwrap_or("")).await?;

    let sort = listing.query.sort_expression();
    Ok(Json(PaginatedResponse::new(
        listing.page.items,
        listing.page.total,
        listing.query.limit,
        listing.query.offset,
        sort,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/certificates/{id}",
    params(
        ("id" = i64, Path, description = "Certificate id"),
        ("expand" = Option<String>, Query, description = "Relations to attach, e.g. `owner`"),
    ),
    responses(
        (status = 200, description = "Certificate details", body = Certificate),
        (status = 400, description = "Invalid id or store failure", body = ErrorBody),
        (status = 404, description = "Certificate not found", body = ErrorBody),
    ),
    tag = "certificates"
)]
#[instrument(skip(state, raw_query))]
pub async fn get_certificate_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Certificate>, ApiError> {
    let id = parse_certificate_id(&id)?;
    let expand = expansions_from_query(raw_query.as_deref());
    let certificate = state.certificates.get(id, &expand).await?;
    Ok(Json(certificate))
}

#[utoipa::path(
    post,
    path = "/api/v1/certificates",
    request_body = NewCertificate,
    responses(
        (status = 200, description = "Certificate created", body = Certificate),
        (status = 400, description = "Invalid payload or validation failure", body = ErrorBody),
    ),
    tag = "certificates"
)]
#[instrument(skip(state, body), fields(user_id = auth.user_id))]
pub async fn create_certificate_handler(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Json<Certificate>, ApiError> {
    let certificate = state.certificates.create(&body, auth.user_id).await?;
    Ok(Json(certificate))
}

#[utoipa::path(
    put,
    path = "/api/v1/certificates/{id}",
    params(("id" = i64, Path, description = "Certificate id")),
    request_body(
        content = serde_json::Value,
        description = "Fields to change; allowed keys depend on the stored certificate type"
    ),
    responses(
        (status = 200, description = "Certificate updated", body = Certificate),
        (status = 400, description = "Invalid payload or schema failure", body = ErrorBody),
        (status = 404, description = "Certificate not found", body = ErrorBody),
        (status = 500, description = "Update schema could not be evaluated", body = ErrorBody),
    ),
    tag = "certificates"
)]
#[instrument(skip(state, body))]
pub async fn update_certificate_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Certificate>, ApiError> {
    let id = parse_certificate_id(&id)?;
    let certificate = state.certificates.update(id, &body).await?;
    Ok(Json(certificate))
}

#[utoipa::path(
    delete,
    path = "/api/v1/certificates/{id}",
    params(("id" = i64, Path, description = "Certificate id")),
    responses(
        (status = 200, description = "Certificate deleted", body = DeleteCertificateResponse),
        (status = 400, description = "Certificate still used by a host", body = ErrorBody),
        (status = 404, description = "Certificate not found", body = ErrorBody),
    ),
    tag = "certificates"
)]
#[instrument(skip(state))]
pub async fn delete_certificate_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteCertificateResponse>, ApiError> {
    let id = parse_certificate_id(&id)?;
    state.certificates.delete(id).await?;
    Ok(Json(DeleteCertificateResponse { deleted: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Expansion;

    #[test]
    fn certificate_ids_must_be_positive_integers() {
        assert_eq!(parse_certificate_id("42").unwrap(), 42);
        assert!(parse_certificate_id("0").is_err());
        assert!(parse_certificate_id("-3").is_err());
        assert!(parse_certificate_id("abc").is_err());
        assert!(parse_certificate_id("1.5").is_err());
    }

    #[test]
    fn expand_is_read_from_query_string() {
        assert!(expansions_from_query(Some("expand=owner")).contains(Expansion::Owner));
        assert!(expansions_from_query(Some("foo=1&expand=user%2Cmissing"))
            .contains(Expansion::Owner));
        assert!(expansions_from_query(Some("expand=missing")).is_empty());
        assert!(expansions_from_query(None).is_empty());
    }
}
