//! Axum middleware for bearer authentication.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::{field, info_span, warn};

use crate::api::error::ApiError;
use crate::auth::jwt::TokenService;

pub type TokenServiceState = Arc<TokenService>;

/// Authenticate the request and attach an [`AuthContext`](super::AuthContext)
/// to its extensions.
pub async fn authenticate(
    State(tokens): State<TokenServiceState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let correlation_id = uuid::Uuid::new_v4();
    let span = info_span!(
        "auth_middleware.authenticate",
        http.method = %request.method(),
        http.path = %request.uri().path(),
        auth.user_id = field::Empty,
        correlation_id = %correlation_id
    );

    let header = request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok());

    match tokens.authenticate_header(header) {
        Ok(context) => {
            span.record("auth.user_id", context.user_id);
            request.extensions_mut().insert(context);
            Ok(next.run(request).await)
        }
        Err(err) => {
            let _guard = span.enter();
            warn!(%correlation_id, error = %err, "authentication failed");
            Err(ApiError::from(err))
        }
    }
}
