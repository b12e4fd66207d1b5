//! Error types for the broker.

use std::time::Duration;

use keyrelay_cdm::CdmError;
use keyrelay_core::{CoreError, ValidationError};
use keyrelay_gate::GateError;
use keyrelay_store::StoreError;
use thiserror::Error;

/// Every failure a broker operation reports to its caller.
///
/// Validation, Unauthenticated, Forbidden, NotFound and RateLimited are the
/// caller's to fix. Upstream and Storage are server faults. None of them is
/// retried by the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Missing or malformed request field.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Missing or unknown passkey.
    #[error("missing or invalid passkey")]
    Unauthenticated,

    /// Known passkey, insufficient tier.
    #[error("you aren't authorized to perform this action")]
    Forbidden,

    /// Nothing stored under the requested key.
    #[error("{0}")]
    NotFound(String),

    /// Per-passkey request ceiling reached.
    #[error("too many requests, try again later")]
    RateLimited { retry_after: Duration },

    /// The CDM, or decoding what goes to or comes from it, failed.
    #[error("cdm failure: {0}")]
    Upstream(String),

    /// Persistence timeout or driver fault.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The gate was misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// Whether the failure is on the server side.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            BrokerError::Upstream(_) | BrokerError::Storage(_) | BrokerError::Config(_)
        )
    }
}

impl From<GateError> for BrokerError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Unauthenticated => BrokerError::Unauthenticated,
            GateError::Forbidden { .. } => BrokerError::Forbidden,
            GateError::RateLimited { retry_after, .. } => BrokerError::RateLimited { retry_after },
            GateError::Counter(e) => BrokerError::Storage(e),
            GateError::InvalidConfig(message) => BrokerError::Config(message),
        }
    }
}

impl From<CdmError> for BrokerError {
    fn from(e: CdmError) -> Self {
        BrokerError::Upstream(e.to_string())
    }
}

impl From<CoreError> for BrokerError {
    fn from(e: CoreError) -> Self {
        BrokerError::Upstream(e.to_string())
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::AuthorizationPolicy;

    #[test]
    fn test_gate_errors_convert() {
        assert!(matches!(
            BrokerError::from(GateError::Forbidden {
                required: AuthorizationPolicy::SuperUserOnly
            }),
            BrokerError::Forbidden
        ));
        assert!(matches!(
            BrokerError::from(GateError::RateLimited {
                limit: 1,
                retry_after: Duration::from_secs(3)
            }),
            BrokerError::RateLimited { retry_after } if retry_after == Duration::from_secs(3)
        ));
        assert!(BrokerError::from(GateError::Counter(StoreError::Closed)).is_server_fault());
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = BrokerError::from(ValidationError::MissingField("pssh"));
        assert_eq!(err.to_string(), "pssh field can not be empty");
        assert!(!err.is_server_fault());
    }
}
