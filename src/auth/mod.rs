//! Authentication module entry point.
//!
//! Bearer tokens are HS256 JWTs whose `sub` claim is the numeric id of the
//! calling user. Tokens are minted by `certplane issue-token`.

pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::{Claims, TokenService};
pub use middleware::authenticate;
pub use models::AuthContext;
