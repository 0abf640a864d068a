//! JWT utilities for Certplane authentication.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::models::AuthContext;
use crate::config::AuthConfig;
use crate::errors::{AuthErrorType, CertplaneError, Result};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // user id
    pub iss: String,
    pub exp: u64,
    pub iat: u64,
}

/// Issues and verifies bearer tokens
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    expiry_seconds: u64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("expiry_seconds", &self.expiry_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer: config.jwt_issuer.clone(),
            expiry_seconds: config.token_expiry_seconds,
        }
    }

    /// Mint a token for `user_id` valid for the configured lifetime
    pub fn issue(&self, user_id: i64) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CertplaneError::internal(format!("System clock error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            exp: now + self.expiry_seconds,
            iat: now,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CertplaneError::internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify a raw token and return the caller it identifies
    pub fn verify(&self, token: &str) -> Result<AuthContext> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    CertplaneError::auth("token has expired", AuthErrorType::ExpiredToken)
                }
                _ => CertplaneError::auth(
                    format!("invalid token: {}", e),
                    AuthErrorType::InvalidToken,
                ),
            }
        })?;

        let user_id = data.claims.sub.parse::<i64>().ok().filter(|id| *id > 0).ok_or_else(|| {
            CertplaneError::auth("token subject is not a user id", AuthErrorType::InvalidToken)
        })?;

        Ok(AuthContext::new(user_id))
    }

    /// Verify an `Authorization` header value of the form `Bearer <token>`
    pub fn authenticate_header(&self, header: Option<&str>) -> Result<AuthContext> {
        let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or_else(|| {
            CertplaneError::auth("missing bearer token", AuthErrorType::MissingToken)
        })?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CertplaneError::auth(
                    "authorization header must use the Bearer scheme",
                    AuthErrorType::InvalidToken,
                )
            })?;

        self.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig::default())
    }

    fn auth_error_type(err: CertplaneError) -> AuthErrorType {
        match err {
            CertplaneError::Auth { error_type, .. } => error_type,
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let service = service();
        let token = service.issue(42).unwrap();
        assert_eq!(service.verify(&token).unwrap(), AuthContext::new(42));

        let header = format!("Bearer {}", token);
        assert_eq!(service.authenticate_header(Some(&header)).unwrap().user_id, 42);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service().issue(1).unwrap();
        let other = TokenService::new(&AuthConfig {
            jwt_secret: "another-secret-that-is-long-enough-123".to_string(),
            ..Default::default()
        });

        assert_eq!(auth_error_type(other.verify(&token).unwrap_err()), AuthErrorType::InvalidToken);
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = service().issue(1).unwrap();
        let other = TokenService::new(&AuthConfig {
            jwt_issuer: "someone-else".to_string(),
            ..Default::default()
        });
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = AuthConfig::default();
        let claims =
            Claims { sub: "1".to_string(), iss: config.jwt_issuer.clone(), exp: 1, iat: 0 };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        let err = service().verify(&token).unwrap_err();
        assert_eq!(auth_error_type(err), AuthErrorType::ExpiredToken);
    }

    #[test]
    fn test_non_numeric_subject_rejected() {
        let config = AuthConfig::default();
        let claims = Claims {
            sub: "alice".to_string(),
            iss: config.jwt_issuer.clone(),
            exp: u64::MAX / 2,
            iat: 0,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_header_parsing() {
        let service = service();
        assert_eq!(
            auth_error_type(service.authenticate_header(None).unwrap_err()),
            AuthErrorType::MissingToken
        );
        assert_eq!(
            auth_error_type(service.authenticate_header(Some("Basic abc")).unwrap_err()),
            AuthErrorType::InvalidToken
        );
        assert!(service.authenticate_header(Some("Bearer not-a-jwt")).is_err());
    }
}
