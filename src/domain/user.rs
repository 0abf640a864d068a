//! User types referenced by certificates.
//!
//! Users are managed elsewhere; certificates only need enough of them to
//! record ownership and to render the `owner` expansion.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Public view of the user that owns a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: i64,
    pub name: String,
    pub email: String,
}
