use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::CertplaneError;
use crate::services::{CertificateError, SchemaErrorDetail};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Internal(String),
    Certificate(CertificateError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Certificate(err) => match err {
                CertificateError::NotFound(_) => StatusCode::NOT_FOUND,
                CertificateError::SchemaFatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CertificateError::InvalidPayload(_)
                | CertificateError::InvalidQuery(_)
                | CertificateError::Persistence(_)
                | CertificateError::Validation { .. }
                | CertificateError::SchemaErrors { .. }
                | CertificateError::Conflict(_) => StatusCode::BAD_REQUEST,
            },
        }
    }

    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }
}

/// Error envelope returned by every failing endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error kind
    #[schema(example = "schema_validation_failed")]
    pub error: &'static str,
    /// Human-readable description
    pub message: String,
    /// Field-level failures, present for schema validation errors only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<SchemaErrorDetail>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        let body = match self {
            ApiError::BadRequest(message) => {
                ErrorBody { error: "bad_request", message, errors: None }
            }
            ApiError::NotFound(message) => ErrorBody { error: "not_found", message, errors: None },
            ApiError::Unauthorized(message) => {
                ErrorBody { error: "unauthorized", message, errors: None }
            }
            ApiError::Internal(message) => {
                ErrorBody { error: "internal_error", message, errors: None }
            }
            ApiError::Certificate(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, kind = err.kind(), "Certificate request failed");
                }
                let error = err.kind();
                let message = err.to_string();
                let errors = match err {
                    CertificateError::SchemaErrors { errors, .. } => Some(errors),
                    _ => None,
                };
                ErrorBody { error, message, errors }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CertificateError> for ApiError {
    fn from(err: CertificateError) -> Self {
        ApiError::Certificate(err)
    }
}

impl From<CertplaneError> for ApiError {
    fn from(err: CertplaneError) -> Self {
        match err {
            CertplaneError::Auth { message, .. } => {
                ApiError::Unauthorized(format!("Unauthorized: {}", message))
            }
            CertplaneError::Validation { message, .. } => ApiError::BadRequest(message),
            CertplaneError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            other => {
                tracing::error!(error = %other, "Unhandled internal error");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CertificateType;
    use crate::errors::AuthErrorType;
    use crate::services::SchemaFatal;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn certificate_errors_map_to_client_statuses() {
        let cases = vec![
            (CertificateError::InvalidPayload("bad".into()), StatusCode::BAD_REQUEST),
            (CertificateError::NotFound(3), StatusCode::NOT_FOUND),
            (CertificateError::Conflict(3), StatusCode::BAD_REQUEST),
            (
                CertificateError::Validation { message: "nope".into(), field: None },
                StatusCode::BAD_REQUEST,
            ),
            (
                CertificateError::SchemaFatal(SchemaFatal {
                    certificate_type: CertificateType::Http,
                    message: "broken".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let kind = error.kind();
            let (status, body) = body_json(ApiError::from(error)).await;
            assert_eq!(status, expected);
            assert_eq!(body["error"], kind);
            assert!(body.get("errors").is_none());
        }
    }

    #[tokio::test]
    async fn schema_errors_carry_field_list() {
        let error = CertificateError::SchemaErrors {
            certificate_type: CertificateType::Custom,
            errors: vec![SchemaErrorDetail {
                path: "/name".to_string(),
                message: "\"name\" is a required property".to_string(),
            }],
        };

        let (status, body) = body_json(error.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "schema_validation_failed");
        assert_eq!(body["errors"][0]["path"], "/name");
    }

    #[tokio::test]
    async fn auth_errors_are_unauthorized() {
        let error = CertplaneError::auth("token has expired", AuthErrorType::ExpiredToken);
        let (status, body) = body_json(error.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }
}
