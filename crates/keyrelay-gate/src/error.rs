//! Error types for the admission gate.

use std::time::Duration;

use keyrelay_core::AuthorizationPolicy;
use keyrelay_store::StoreError;
use thiserror::Error;

/// Reasons a request is turned away at the gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// No passkey, or one the permission store does not recognise.
    #[error("missing or invalid passkey")]
    Unauthenticated,

    /// Known passkey without the privileges the route requires.
    #[error("you aren't authorized to perform this action ({required} required)")]
    Forbidden { required: AuthorizationPolicy },

    /// The passkey used up its window.
    #[error("too many requests, try again in {}s", retry_after_secs(.retry_after))]
    RateLimited { limit: u64, retry_after: Duration },

    /// The rate counter could not be updated.
    #[error("rate counter unavailable: {0}")]
    Counter(#[from] StoreError),

    /// Rejected limiter settings.
    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Whole seconds to wait, rounded up, never below one.
pub fn retry_after_secs(retry_after: &Duration) -> u64 {
    let millis = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
    millis.div_ceil(1_000).max(1)
}
