//! MachineConfig CRD
//!
//! The rendered configuration artifact. The controller writes one per pool;
//! `spec.config` holds an Ignition document.

use crate::kubelet_config::preserve_unknown_fields;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "MachineConfig",
    shortname = "mc"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    /// Ignition document applied to the pool's nodes
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: serde_json::Value,
}
