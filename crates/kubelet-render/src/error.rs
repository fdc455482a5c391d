//! Rendering errors

use thiserror::Error;

/// Errors raised while resolving feature gates or rendering a pool's
/// kubelet configuration.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A feature gate appears in both the enabled and disabled lists of a
    /// `CustomNoUpgrade` policy. Needs a human to fix the policy.
    #[error("feature gate {feature} is both enabled and disabled in the CustomNoUpgrade policy")]
    ConflictingOverride { feature: String },

    /// A matched KubeletConfig cannot be applied
    #[error("failed to render KubeletConfig {override_name}: {reason}")]
    RenderFailed {
        override_name: String,
        reason: String,
    },

    /// The base template could not be rendered or parsed
    #[error("Template error: {0}")]
    Template(String),

    /// An Ignition payload or data URL could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A Kubernetes object is missing data required to build the model
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RenderError {
    pub(crate) fn render_failed(override_name: &str, reason: impl Into<String>) -> Self {
        Self::RenderFailed {
            override_name: override_name.to_string(),
            reason: reason.into(),
        }
    }
}
