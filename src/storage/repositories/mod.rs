//! Repository modules for data access
//!
//! Each repository exposes a trait the services depend on and a sqlx
//! implementation of it.

pub mod certificate;
pub mod host;
pub mod user;

pub use certificate::{CertificateStore, DeleteOutcome, SqlxCertificateRepository, StatusUpdate};
pub use host::{ReferenceGuard, SqlxHostRepository};
pub use user::{OwnerDirectory, SqlxUserRepository};
