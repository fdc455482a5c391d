//! Rendered artifacts
//!
//! A [`RenderedArtifact`] is everything the reconciler needs to write a
//! pool's MachineConfig: its names, the Ignition payload and provenance.

use crate::encoder::encode_ignition;
use crate::error::RenderError;
use crate::keys::{keys_for, ArtifactKeys};
use crate::model::Pool;
use crate::render::RenderedConfig;
use crds::{MachineConfig, MachineConfigSpec, GENERATED_BY_ANNOTATION, POOL_GENERATION_ANNOTATION, ROLE_LABEL};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Version stamped into generated MachineConfigs
pub const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArtifact {
    pub keys: ArtifactKeys,
    pub pool_name: String,
    /// Pool generation the artifact was rendered from
    pub pool_generation: i64,
    /// Ignition document, stored as `spec.config`
    pub payload: serde_json::Value,
    /// `data:` URL of the embedded kubelet configuration
    pub content_source: String,
}

/// Wraps a rendered config into the artifact for `pool`
pub fn build_artifact(pool: &Pool, config: &RenderedConfig) -> Result<RenderedArtifact, RenderError> {
    let (payload, content_source) = encode_ignition(config)?;
    Ok(RenderedArtifact {
        keys: keys_for(pool),
        pool_name: pool.name.clone(),
        pool_generation: pool.generation,
        payload,
        content_source,
    })
}

impl RenderedArtifact {
    /// Whether a stored MachineConfig already carries this payload.
    ///
    /// Only `spec.config` is compared; provenance annotations alone never
    /// cause a write.
    pub fn matches(&self, existing: &MachineConfig) -> bool {
        existing.spec.config == self.payload
    }

    /// New MachineConfig object under the canonical name
    pub fn to_machine_config(&self) -> MachineConfig {
        MachineConfig {
            metadata: ObjectMeta {
                name: Some(self.keys.canonical.clone()),
                labels: Some(BTreeMap::from([(ROLE_LABEL.to_string(), self.pool_name.clone())])),
                annotations: Some(self.annotations()),
                ..Default::default()
            },
            spec: MachineConfigSpec {
                config: self.payload.clone(),
            },
        }
    }

    /// `existing` with this payload and provenance applied, keeping its
    /// resource version for the optimistic update
    pub fn apply_to(&self, existing: &MachineConfig) -> MachineConfig {
        let mut updated = existing.clone();
        updated.spec.config = self.payload.clone();
        updated.metadata.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(ROLE_LABEL.to_string(), self.pool_name.clone());
        updated.metadata.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(self.annotations());
        updated
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (POOL_GENERATION_ANNOTATION.to_string(), self.pool_generation.to_string()),
            (GENERATED_BY_ANNOTATION.to_string(), CONTROLLER_VERSION.to_string()),
        ])
    }
}
