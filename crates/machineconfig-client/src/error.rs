//! MachineConfig store errors

use thiserror::Error;

/// Errors that can occur when reading or writing MachineConfigs
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist
    #[error("MachineConfig {0} not found")]
    NotFound(String),

    /// The write raced with another writer: the object already exists, or it
    /// changed since it was read
    #[error("MachineConfig {0} was modified concurrently")]
    Conflict(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request (e.g., missing name or resource version)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
