//! Service-to-service authentication
//!
//! Callers present an EdDSA-signed JWT as `Authorization: Bearer <token>`.
//! Each protected route group admits only the issuers configured for it.

mod middleware;
mod token;

pub use middleware::{require_bearer, Authenticator, RouteGroup, RouteGuard};
pub use token::{AuthError, Claims, TokenIssuer, TokenVerifier};
