//! OAuth2 / OpenID Connect client flows.

pub mod authorize;
pub mod client_auth;
pub mod discovery;
pub mod token;

pub use client_auth::AuthenticationType;
pub use token::{AccessTokenRequest, AccessTokenResponse, GrantType};
