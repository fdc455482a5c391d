//! FeatureGate CRD
//!
//! Cluster-wide selection of optional behaviours. Exactly one instance,
//! named [`CLUSTER_FEATURE_GATE_NAME`], is honoured.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the singleton FeatureGate object
pub const CLUSTER_FEATURE_GATE_NAME: &str = "cluster";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "FeatureGate"
)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGateSpec {
    /// Feature set name: "", "Default", "CustomNoUpgrade" or "TechPreviewNoUpgrade".
    /// Kept as a plain string so unknown values survive decoding.
    #[serde(default)]
    pub feature_set: String,

    /// Explicit gate lists, only honoured for "CustomNoUpgrade"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_no_upgrade: Option<CustomFeatureGates>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomFeatureGates {
    /// Feature gates forced on
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Feature gates forced off
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_feature_set_survives_decoding() {
        let spec: FeatureGateSpec = serde_json::from_value(serde_json::json!({
            "featureSet": "LatencySensitive"
        }))
        .unwrap();
        assert_eq!(spec.feature_set, "LatencySensitive");
        assert!(spec.custom_no_upgrade.is_none());
    }

    #[test]
    fn test_empty_spec_defaults() {
        let spec: FeatureGateSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec.feature_set, "");
    }
}
