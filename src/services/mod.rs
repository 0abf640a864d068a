//! Business logic services
//!
//! The certificate lifecycle and the pieces it composes: update schemas,
//! provisioning and job dispatch.

pub mod certificate_service;
pub mod dispatcher;
pub mod provisioner;
pub mod schema;

pub use certificate_service::{CertificateError, CertificateListing, CertificateService};
pub use dispatcher::{
    DispatchObserver, ProvisioningDispatcher, TracingObserver, REQUEST_CERTIFICATE_JOB,
};
pub use provisioner::{CertificateProvisioner, IssuedCertificate, Issuer, UnconfiguredIssuer};
pub use schema::{update_schema, CertificateSchemaValidator, SchemaErrorDetail, SchemaFatal};
