//! Error types for the CDM boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a CDM engine or while talking to one.
#[derive(Debug, Error)]
pub enum CdmError {
    /// A credential file could not be read.
    #[error("failed to read {what} from {}: {source}", path.display())]
    CredentialIo {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A credential was present but unusable.
    #[error("invalid {0}: file is empty")]
    EmptyCredential(&'static str),

    /// The PSSH bytes were rejected.
    #[error("invalid init data: {0}")]
    InvalidInitData(String),

    /// The engine refused to build a request or decrypt a license.
    #[error("cdm session error: {0}")]
    Session(String),

    /// The helper process could not be started or waited on.
    #[error("cdm helper failed: {0}")]
    Process(String),

    /// The helper exited unsuccessfully.
    #[error("cdm helper exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    /// The helper did not answer in time.
    #[error("cdm helper timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The helper answered with something we could not read.
    #[error("malformed cdm response: {0}")]
    Protocol(String),
}

/// Result type for CDM operations.
pub type Result<T> = std::result::Result<T, CdmError>;
