//! Proxy host references.
//!
//! A host serves one or more domain names and may point at a certificate.
//! Hosts are owned by the proxy configuration, not by this service; the
//! certificate lifecycle only reads how many of them reference a certificate.

use serde::{Deserialize, Serialize};

/// A proxy host as far as certificate bookkeeping is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: i64,
    pub domain_names: Vec<String>,
    pub certificate_id: Option<i64>,
}
