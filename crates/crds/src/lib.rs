//! Kubelet Config CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed and produced by the
//! kubelet config controller:
//! - `MachineConfigPool`: a named group of machines, matched by labels
//! - `KubeletConfig`: a selector-scoped partial kubelet configuration
//! - `FeatureGate`: the cluster-wide feature set selection
//! - `MachineConfig`: the rendered artifact written for each pool

pub mod feature_gate;
pub mod kubelet_config;
pub mod machine_config;
pub mod machine_config_pool;

pub use feature_gate::*;
pub use kubelet_config::*;
pub use machine_config::*;
pub use machine_config_pool::*;

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

use std::collections::BTreeMap;

/// Selector requiring a single label to be present with the given value
pub fn label_selector(key: impl Into<String>, value: impl Into<String>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([(key.into(), value.into())])),
        match_expressions: None,
    }
}

/// API group shared by every CRD in this crate
pub const API_GROUP: &str = "dcops.microscaler.io";

/// Label carried by generated MachineConfigs naming the pool they target
pub const ROLE_LABEL: &str = "dcops.microscaler.io/role";

/// Annotation recording the pool generation an artifact was rendered from
pub const POOL_GENERATION_ANNOTATION: &str = "dcops.microscaler.io/pool-generation";

/// Annotation recording the controller version that rendered an artifact
pub const GENERATED_BY_ANNOTATION: &str = "dcops.microscaler.io/generated-by-controller-version";
