//! Error types for dispatch failures

use std::time::Duration;
use thiserror::Error;

use crate::registry::RegistryError;

/// Errors that can occur during credential selection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// A full rotation pass found no credential with capacity for the model
    #[error("No available credential for model '{model}' ({examined} examined)")]
    NoAvailableCredential {
        model: String,
        examined: usize,
        /// Shortest wait until some rate-limited credential regains a token
        retry_after: Option<Duration>,
    },

    /// The session used its first attempt and every allowed retry
    #[error("Retries exhausted for model '{model}' after {attempts} attempts")]
    RetriesExhausted { model: String, attempts: u32 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl DispatchError {
    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchError::NoAvailableCredential { .. } => "no_available_credential",
            DispatchError::RetriesExhausted { .. } => "retries_exhausted",
            DispatchError::Registry(_) => "registry",
        }
    }
}
