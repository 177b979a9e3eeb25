//! Caller identity
//!
//! Authentication itself lives with the identity provider; requests carry
//! its bearer token and the `sub` claim names the acting member.

mod jwt;
mod middleware;

pub use jwt::decode_token;
pub use middleware::auth_middleware;

#[cfg(test)]
pub use jwt::issue_token;

use uuid::Uuid;

/// The authenticated member behind a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
}
