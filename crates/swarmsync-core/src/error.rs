//! Error types for swarmsync core operations.
//!
//! This module defines the error types used throughout the `swarmsync-core` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in swarmsync core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Credential file could not be read.
    #[error("Failed to read credential file {path}: {source}")]
    CredentialFile {
        /// Path to the credential file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Credential file is not valid JSON.
    #[error("Failed to parse credential file: {0}")]
    CredentialParse(#[from] serde_json::Error),

    /// Image reference could not be parsed.
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidImageReference {
        /// The offending reference.
        reference: String,
        /// Reason the reference is invalid.
        reason: String,
    },

    /// A schedule field could not be evaluated.
    #[error("Invalid schedule field {field} '{value}': {reason}")]
    InvalidSchedule {
        /// Name of the field (minute, hour, ...).
        field: &'static str,
        /// Raw field text.
        value: String,
        /// Reason the field is invalid.
        reason: String,
    },
}
