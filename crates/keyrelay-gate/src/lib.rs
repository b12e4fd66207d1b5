//! # Keyrelay Gate
//!
//! Every protected call passes the [`AdmissionGate`] before any handler runs.
//!
//! ## Checks, in order
//!
//! 1. **Credential**: the passkey must exist in the [`PermissionStore`].
//!    Missing, unknown or unreadable credentials are [`GateError::Unauthenticated`].
//! 2. **Tier**: the stored privileges must satisfy the route's
//!    [`AuthorizationPolicy`], otherwise [`GateError::Forbidden`].
//! 3. **Rate**: one hit is counted against the passkey's fixed window in the
//!    [`RateCounter`]; over the ceiling is [`GateError::RateLimited`].
//!
//! Nothing is cached between calls, so a revocation takes effect on the very
//! next request.
//!
//! [`PermissionStore`]: keyrelay_store::PermissionStore
//! [`RateCounter`]: keyrelay_store::RateCounter
//! [`AuthorizationPolicy`]: keyrelay_core::AuthorizationPolicy

pub mod admission;
pub mod error;
pub mod limits;

pub use admission::{Admission, AdmissionGate};
pub use error::{retry_after_secs, GateError, Result};
pub use limits::{RateLimitConfig, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
