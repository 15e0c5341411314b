//! Error types for rapid-verify.

use thiserror::Error;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the verification engine.
///
/// Evidence failures (DNS, HTTP, token mismatch) are not represented here:
/// they are reported through [`crate::strategy::CheckFailure`] and surface
/// as a failed [`crate::VerifyOutcome`], never as an `Err`.
#[derive(Debug, Error)]
pub enum Error {
    /// The requesting developer is unknown to the developer directory.
    #[error("developer not found: {0}")]
    DeveloperNotFound(String),

    /// The app does not exist or is not owned by the requesting developer.
    #[error("app not found: {0}")]
    AppNotFound(String),

    /// The claimed domain is not a syntactically valid hostname.
    #[error("invalid domain {domain:?}: {reason}")]
    InvalidDomain {
        /// The rejected input.
        domain: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The verification type string is not one of the supported methods.
    #[error("invalid verification type: {0}")]
    InvalidVerificationType(String),

    /// No proof with this id is visible to the caller.
    #[error("verification not found: {0}")]
    NotFound(String),

    /// A concurrent writer changed the record, or the id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Proof store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Collaborator (directory, notifier) failure.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A verification task ended without producing a result.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors caused by caller input rather than the engine.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::DeveloperNotFound(_)
                | Self::AppNotFound(_)
                | Self::InvalidDomain { .. }
                | Self::InvalidVerificationType(_)
        )
    }
}
