//! # Error Handling
//!
//! Crate-wide error types for the Certplane certificate service, built on
//! `thiserror`. Service-level failures that must map onto a specific HTTP
//! contract live next to the service (see [`crate::services::CertificateError`]).

pub mod types;

pub use types::{AuthErrorType, CertplaneError, Result};

/// Short alias used throughout the crate.
pub type Error = CertplaneError;
