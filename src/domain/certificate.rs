//! Certificate entity and its value types.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::domain::user::Owner;
use crate::errors::{CertplaneError, Result};

const MAX_DOMAIN_NAMES: usize = 100;

static DOMAIN_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\*\.)?([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$",
    )
    .expect("domain name regex is valid")
});

/// How a certificate is obtained. Selects the update schema and the
/// provisioning path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    /// Certificate material uploaded by the user
    Custom,
    /// ACME HTTP-01 challenge
    Http,
    /// ACME DNS-01 challenge through a DNS provider
    Dns,
    /// Locally trusted development certificate
    Mkcert,
}

impl CertificateType {
    pub const ALL: [CertificateType; 4] = [Self::Custom, Self::Http, Self::Dns, Self::Mkcert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Http => "http",
            Self::Dns => "dns",
            Self::Mkcert => "mkcert",
        }
    }

    /// Types issued through a certificate authority
    pub fn requires_authority(&self) -> bool {
        matches!(self, Self::Http | Self::Dns)
    }

    /// Whether certificate material is produced by an issuer rather than supplied
    pub fn is_issued(&self) -> bool {
        !matches!(self, Self::Custom)
    }
}

impl FromStr for CertificateType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "custom" => Ok(Self::Custom),
            "http" => Ok(Self::Http),
            "dns" => Ok(Self::Dns),
            "mkcert" => Ok(Self::Mkcert),
            other => Err(format!("Unknown certificate type '{}'", other)),
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provisioning state of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Ready,
    Requesting,
    Provided,
    Failed,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Requesting => "requesting",
            Self::Provided => "provided",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for CertificateStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Self::Ready),
            "requesting" => Ok(Self::Requesting),
            "provided" => Ok(Self::Provided),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown certificate status '{}'", other)),
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A TLS certificate record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Store-assigned identifier, 0 until first saved
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub certificate_type: CertificateType,
    pub owner_id: i64,
    pub certificate_authority_id: Option<i64>,
    pub dns_provider_id: Option<i64>,
    #[validate(length(min = 1, max = 255, message = "name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_domain_names"))]
    pub domain_names: Vec<String>,
    pub status: CertificateStatus,
    pub error_message: String,
    #[serde(default = "empty_meta")]
    #[schema(value_type = Object)]
    pub meta: Value,
    pub is_ecc: bool,
    /// Owning user, present only when the `owner` expansion was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

impl Certificate {
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    /// Rules the store enforces before writing a row.
    pub fn validate_for_save(&self) -> Result<()> {
        self.validate()?;

        if !self.meta.is_object() {
            return Err(CertplaneError::validation_field("meta must be a JSON object", "meta"));
        }

        if self.certificate_type.requires_authority() && self.certificate_authority_id.is_none() {
            return Err(CertplaneError::validation_field(
                format!(
                    "{} certificates require a certificate authority",
                    self.certificate_type
                ),
                "certificateAuthorityId",
            ));
        }

        if self.certificate_type == CertificateType::Dns && self.dns_provider_id.is_none() {
            return Err(CertplaneError::validation_field(
                "dns certificates require a DNS provider",
                "dnsProviderId",
            ));
        }

        if self.certificate_type.is_issued() && self.domain_names.is_empty() {
            return Err(CertplaneError::validation_field(
                format!("{} certificates require at least one domain name", self.certificate_type),
                "domainNames",
            ));
        }

        Ok(())
    }
}

fn empty_meta() -> Value {
    Value::Object(Default::default())
}

fn validate_domain_names(domains: &[String]) -> std::result::Result<(), ValidationError> {
    if domains.len() > MAX_DOMAIN_NAMES {
        let mut error = ValidationError::new("too_many_domain_names");
        error.message =
            Some(format!("at most {} domain names are allowed", MAX_DOMAIN_NAMES).into());
        return Err(error);
    }

    let invalid = domains.iter().find(|d| d.len() > 253 || !DOMAIN_NAME_REGEX.is_match(d));
    if let Some(invalid) = invalid {
        let mut error = ValidationError::new("invalid_domain_name");
        error.message = Some(format!("'{}' is not a valid domain name", invalid).into());
        return Err(error);
    }

    Ok(())
}

/// Payload accepted when creating a certificate.
///
/// Server-managed fields (`id`, `ownerId`, `status`, timestamps) are not part
/// of the shape; clients sending them have them ignored.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewCertificate {
    #[serde(rename = "type")]
    pub certificate_type: CertificateType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain_names: Vec<String>,
    #[serde(default)]
    pub certificate_authority_id: Option<i64>,
    #[serde(default)]
    pub dns_provider_id: Option<i64>,
    #[serde(default = "empty_meta")]
    #[schema(value_type = Object)]
    pub meta: Value,
    #[serde(default)]
    pub is_ecc: bool,
}

impl NewCertificate {
    /// Build an unsaved certificate owned by `owner_id`.
    pub fn into_certificate(self, owner_id: i64) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: 0,
            created_at: now,
            updated_at: now,
            expires_at: None,
            certificate_type: self.certificate_type,
            owner_id,
            certificate_authority_id: self.certificate_authority_id,
            dns_provider_id: self.dns_provider_id,
            name: self.name,
            domain_names: self.domain_names,
            status: CertificateStatus::Ready,
            error_message: String::new(),
            meta: self.meta,
            is_ecc: self.is_ecc,
            owner: None,
        }
    }
}

/// Related data that can be attached to certificates at read time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Expansion {
    Owner,
}

impl FromStr for Expansion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "owner" | "user" => Ok(Self::Owner),
            other => Err(format!("Unknown expansion '{}'", other)),
        }
    }
}

/// Requested expansions. Unknown names are dropped when parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionSet(BTreeSet<Expansion>);

impl ExpansionSet {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `owner,user`.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::none();
        for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.parse::<Expansion>() {
                Ok(expansion) => set.insert(expansion),
                Err(_) => tracing::debug!(expansion = name, "Ignoring unknown expansion"),
            }
        }
        set
    }

    pub fn insert(&mut self, expansion: Expansion) {
        self.0.insert(expansion);
    }

    pub fn contains(&self, expansion: Expansion) -> bool {
        self.0.contains(&expansion)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
