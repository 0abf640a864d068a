pub mod certificates;
pub mod health;
pub mod pagination;

pub use certificates::{
    create_certificate_handler, delete_certificate_handler, get_certificate_handler,
    list_certificates_handler, update_certificate_handler, CertificateListResponse,
    DeleteCertificateResponse,
};
pub use health::{health_handler, HealthResponse};
pub use pagination::PaginatedResponse;
