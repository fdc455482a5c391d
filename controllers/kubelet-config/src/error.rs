//! Controller-specific error types.
//!
//! Rendering and store errors come from the library crates; this module wraps
//! them and adds the failures that only exist inside the controller process.

use kube::Error as KubeError;
use kubelet_render::RenderError;
use machineconfig_client::StoreError;
use thiserror::Error;

/// Errors reading pools, overrides or the feature policy.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// An object could not be converted into the rendering model
    #[error("Invalid resource: {0}")]
    Invalid(#[from] RenderError),
}

/// Errors that can occur in the kubelet config controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Snapshot source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// MachineConfig store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Feature resolution or rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Every attempt lost a write race against another writer
    #[error("pool {pool}: gave up after {attempts} conflicting writes")]
    ConflictRetriesExhausted { pool: String, attempts: u32 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registration or export failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O error (metrics listener)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// Whether the pool should be reconciled again after a backoff.
    ///
    /// Policy and override errors need a human to edit an object, which
    /// triggers a new reconciliation anyway; conflict exhaustion is reported
    /// and left to the next event.
    pub fn should_requeue(&self) -> bool {
        match self {
            Self::Kube(_) | Self::Io(_) => true,
            Self::Source(SourceError::Kube(_)) => true,
            Self::Source(SourceError::Invalid(_)) => false,
            Self::Store(StoreError::InvalidRequest(_) | StoreError::Serialization(_)) => false,
            Self::Store(_) => true,
            Self::Render(_)
            | Self::ConflictRetriesExhausted { .. }
            | Self::InvalidConfig(_)
            | Self::Watch(_)
            | Self::Metrics(_) => false,
        }
    }

    /// Short label for the reconciliation outcome metric
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Render(RenderError::ConflictingOverride { .. }) => "conflicting_override",
            Self::Render(RenderError::RenderFailed { .. }) => "render_failed",
            Self::ConflictRetriesExhausted { .. } => "conflict_retries_exhausted",
            _ => "error",
        }
    }
}
