//! Error types for the reconciler crate.
//!
//! This module defines all errors that can occur while reconciling services.

use swarmsync_registry::RegistryError;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that can occur while reconciling services.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The orchestrator could not be reached at startup.
    #[error("cannot reach orchestrator at '{endpoint}': {reason}")]
    Startup {
        /// Orchestrator endpoint.
        endpoint: String,
        /// Failure reason.
        reason: String,
    },

    /// An orchestrator call failed.
    #[error("orchestrator {operation} failed: {message}")]
    Orchestrator {
        /// The call that failed.
        operation: &'static str,
        /// Error message from the orchestrator or transport.
        message: String,
    },

    /// The service changed since it was listed; the version token is stale.
    #[error("version conflict updating service '{service}': {message}")]
    VersionConflict {
        /// Service identifier.
        service: String,
        /// Error message from the orchestrator.
        message: String,
    },

    /// Pulling an image failed.
    #[error("pull of '{image}' failed: {message}")]
    PullFailed {
        /// Image that was pulled.
        image: String,
        /// Failure reason.
        message: String,
    },

    /// Inspecting a local image failed.
    #[error("inspect of '{image}' failed: {message}")]
    InspectFailed {
        /// Image that was inspected.
        image: String,
        /// Failure reason.
        message: String,
    },

    /// Registry error during manifest resolution.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Core error (image references, credentials, schedules).
    #[error(transparent)]
    Core(#[from] swarmsync_core::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for invalidity.
        reason: String,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Returns true if the update was rejected because of a stale version token.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Wraps a transport error from an orchestrator call.
    pub(crate) fn orchestrator(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Orchestrator {
            operation,
            message: err.to_string(),
        }
    }
}
