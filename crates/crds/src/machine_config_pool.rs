//! MachineConfigPool CRD
//!
//! A named group of machines sharing configuration. Pools are labelled so
//! that `KubeletConfig` objects can target them by selector.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "MachineConfigPool",
    shortname = "mcp"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    /// Selects the MachineConfigs that make up this pool's configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config_selector: Option<LabelSelector>,

    /// Selects the nodes that belong to this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,

    /// Pauses rollout of configuration to the pool's nodes
    #[serde(default)]
    pub paused: bool,
}
