//! Domain layer
//!
//! Entities and their own validation rules, with no HTTP or database
//! dependencies beyond serde.
//!
//! - `certificate`: certificate records, types, statuses and expansions
//! - `user`: the owner view attached by the `owner` expansion
//! - `host`: proxy hosts that may reference a certificate

pub mod certificate;
pub mod host;
pub mod user;

pub use certificate::{
    Certificate, CertificateStatus, CertificateType, Expansion, ExpansionSet, NewCertificate,
};
pub use host::Host;
pub use user::Owner;
