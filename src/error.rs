//! Error types for coedit
//!
//! Error kinds per the caller contract:
//! - `NotFound`: document or version absent, do not retry
//! - `Unauthorized`: no access or not the lock owner, do not retry
//! - `Conflict`: stale revision or section held by another participant,
//!   retry after resynchronizing
//! - `Validation`: malformed change or configuration
//! - `Internal`: repository or serialization failure

use thiserror::Error;

/// Recoverability category of an error, used by callers to decide
/// between "resync and retry" and "surface to the user".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Conflict,
    Validation,
    Internal,
}

/// Main error type for coedit operations
#[derive(Error, Debug)]
pub enum Error {
    // Not found (do not retry)
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    // Unauthorized (do not retry)
    #[error("Participant {participant_id} does not have access to document {document_id}")]
    AccessDenied {
        document_id: String,
        participant_id: String,
    },

    #[error("Section {section_id} is not locked by {participant_id}")]
    NotLockHolder {
        section_id: String,
        participant_id: String,
    },

    // Conflicts (retry after resync)
    #[error("Section {section_id} is locked by {holder}")]
    SectionLockedByOther { section_id: String, holder: String },

    #[error("Stale revision: change based on {base}, document is at {current}")]
    StaleRevision { base: u64, current: u64 },

    // Validation
    #[error("Invalid change: {0}")]
    InvalidChange(String),

    #[error("Empty change batch")]
    EmptyBatch,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Internal failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Internal invariant violated: {0}")]
    InvariantViolated(String),
}

impl Error {
    /// Get the recoverability category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DocumentNotFound(_) | Error::VersionNotFound(_) => ErrorKind::NotFound,

            Error::AccessDenied { .. } | Error::NotLockHolder { .. } => ErrorKind::Unauthorized,

            Error::SectionLockedByOther { .. } | Error::StaleRevision { .. } => ErrorKind::Conflict,

            Error::InvalidChange(_)
            | Error::EmptyBatch
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_) => ErrorKind::Validation,

            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::InvariantViolated(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry after resynchronizing its copy
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Result type alias for coedit operations
pub type Result<T> = std::result::Result<T, Error>;
