//! # faster-app-auth
//!
//! Authentication and authorization for faster-app.
//!
//! - [`jwt`]: HS256/384/512 token encoding and verification
//! - [`authentication`]: the authenticator chain (`NoAuthentication`,
//!   `JwtAuthentication`, `TokenAuthentication`)
//! - [`permissions`]: the permission chain (`AllowAny`, `IsAuthenticated`,
//!   `IsAdminUser`, `IsOwner`, `IsOwnerOrReadOnly`)

pub mod authentication;
pub mod jwt;
pub mod permissions;

pub use authentication::{
    authenticate, Authentication, JwtAuthentication, MemoryTokenStore, NoAuthentication,
    TokenAuthentication, TokenStore,
};
pub use jwt::{Algorithm, JwtCodec, JwtError};
pub use permissions::{
    check_object_permissions, check_permissions, AllowAny, IsAdminUser, IsAuthenticated, IsOwner,
    IsOwnerOrReadOnly, Permission,
};
