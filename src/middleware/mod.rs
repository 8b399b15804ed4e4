//! Middleware module
//!
//! Contains Tower middleware for rate limiting.

pub mod rate_limiter;

/// Authenticated caller, inserted into request extensions by whatever layer
/// verifies credentials. Rate limiting keys on it when present.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}
