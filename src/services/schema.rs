//! Update-payload validation by certificate type.
//!
//! Each [`CertificateType`] maps to one JSON Schema describing the fields an
//! update may carry for that type. The schema is chosen from the type stored
//! on the certificate, never from the payload. Compiled validators are cached.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::domain::CertificateType;

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SchemaErrorDetail {
    /// JSON pointer to the offending value, empty for the document root
    pub path: String,
    pub message: String,
}

/// The validation engine itself failed; the payload was not judged.
#[derive(Debug, Clone, thiserror::Error)]
#[error("update schema for '{certificate_type}' could not be compiled: {message}")]
pub struct SchemaFatal {
    pub certificate_type: CertificateType,
    pub message: String,
}

/// Update schema for a certificate type
pub fn update_schema(certificate_type: CertificateType) -> Value {
    let name = json!({ "type": "string", "minLength": 1, "maxLength": 255 });
    let domain_names = json!({
        "type": "array",
        "items": { "type": "string", "minLength": 1, "maxLength": 253 },
        "minItems": 1,
        "maxItems": 100,
        "uniqueItems": true
    });
    let reference_id = json!({ "type": "integer", "minimum": 1 });
    let is_ecc = json!({ "type": "boolean" });

    let properties = match certificate_type {
        CertificateType::Http => json!({
            "name": name,
            "domainNames": domain_names,
            "certificateAuthorityId": reference_id,
            "isEcc": is_ecc
        }),
        CertificateType::Dns => json!({
            "name": name,
            "domainNames": domain_names,
            "certificateAuthorityId": reference_id,
            "dnsProviderId": reference_id,
            "isEcc": is_ecc
        }),
        CertificateType::Custom => json!({
            "name": name,
            "domainNames": {
                "type": "array",
                "items": { "type": "string", "minLength": 1, "maxLength": 253 },
                "maxItems": 100
            },
            "meta": {
                "type": "object",
                "properties": {
                    "certificate": { "type": "string" },
                    "certificateKey": { "type": "string" },
                    "intermediateCertificate": { "type": "string" }
                }
            }
        }),
        CertificateType::Mkcert => json!({
            "name": name,
            "domainNames": domain_names,
            "isEcc": is_ecc
        }),
    };

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": format!("Update {} certificate", certificate_type),
        "type": "object",
        "minProperties": 1,
        "additionalProperties": false,
        "required": ["name"],
        "properties": properties
    })
}

/// Validates update payloads against the schema of a certificate type
#[derive(Debug, Clone)]
pub struct CertificateSchemaValidator {
    schemas: Arc<HashMap<CertificateType, Value>>,
    compiled_schemas: Arc<DashMap<CertificateType, Arc<Validator>>>,
}

impl Default for CertificateSchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateSchemaValidator {
    /// Validator using the built-in schema of every type
    pub fn new() -> Self {
        Self::with_schemas(
            CertificateType::ALL.into_iter().map(|t| (t, update_schema(t))).collect(),
        )
    }

    /// Validator with an explicit schema table. Types without an entry are a
    /// [`SchemaFatal`] at validation time.
    pub fn with_schemas(schemas: HashMap<CertificateType, Value>) -> Self {
        Self { schemas: Arc::new(schemas), compiled_schemas: Arc::new(DashMap::new()) }
    }

    /// Validate `payload` against the update schema of `certificate_type`.
    ///
    /// Returns every violation in document order; an empty list means the
    /// payload is acceptable.
    pub fn validate(
        &self,
        certificate_type: CertificateType,
        payload: &Value,
    ) -> Result<Vec<SchemaErrorDetail>, SchemaFatal> {
        let validator = self.get_or_compile_validator(certificate_type)?;

        Ok(validator
            .iter_errors(payload)
            .map(|e| SchemaErrorDetail {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect())
    }

    fn get_or_compile_validator(
        &self,
        certificate_type: CertificateType,
    ) -> Result<Arc<Validator>, SchemaFatal> {
        if let Some(validator) = self.compiled_schemas.get(&certificate_type) {
            return Ok(Arc::clone(&validator));
        }

        let schema = self.schemas.get(&certificate_type).ok_or_else(|| SchemaFatal {
            certificate_type,
            message: "no update schema registered".to_string(),
        })?;

        let validator = Validator::options()
            .with_draft(Draft::Draft7)
            .build(schema)
            .map_err(|e| SchemaFatal { certificate_type, message: e.to_string() })?;

        let validator = Arc::new(validator);
        self.compiled_schemas.insert(certificate_type, Arc::clone(&validator));
        Ok(validator)
    }
}
