//! KubeletConfig CRD
//!
//! A selector-scoped partial kubelet configuration applied on top of the
//! baseline for every matching MachineConfigPool.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "KubeletConfig",
    status = "KubeletConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfigSpec {
    /// Pools this override applies to. An absent selector matches no pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config_pool_selector: Option<LabelSelector>,

    /// Partial `KubeletConfiguration` document merged over the baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub kubelet_config: Option<serde_json::Value>,

    /// Kubelet log verbosity (`KUBELET_LOG_LEVEL`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfigStatus {
    /// Generation of the spec the conditions describe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Outcome of the most recent render of this override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<KubeletConfigCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfigCondition {
    /// Condition type (`Success` or `Failure`)
    #[serde(rename = "type")]
    pub condition_type: KubeletConfigConditionType,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Human readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the condition last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum KubeletConfigConditionType {
    Success,
    Failure,
}

/// Schema for free-form embedded documents
pub(crate) fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_spec_deserializes_free_form_config() {
        let spec: KubeletConfigSpec = serde_json::from_value(serde_json::json!({
            "machineConfigPoolSelector": {"matchLabels": {"pools/worker": ""}},
            "kubeletConfig": {"maxPods": 100, "systemReserved": {"cpu": "500m"}},
            "logLevel": 4
        }))
        .unwrap();

        assert_eq!(spec.kubelet_config.unwrap()["systemReserved"]["cpu"], "500m");
        assert_eq!(spec.log_level, Some(4));
        assert_eq!(spec.machine_config_pool_selector.unwrap().match_labels.unwrap()["pools/worker"], "");
    }

    #[test]
    fn test_crd_is_cluster_scoped() {
        let crd = KubeletConfig::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("kubeletconfigs.dcops.microscaler.io"));
        assert_eq!(crd.spec.scope, "Cluster");
    }

    #[test]
    fn test_condition_type_serializes_as_type() {
        let condition = KubeletConfigCondition {
            condition_type: KubeletConfigConditionType::Failure,
            status: "True".to_string(),
            message: None,
            last_transition_time: None,
        };
        assert_eq!(
            serde_json::to_value(&condition).unwrap(),
            serde_json::json!({"type": "Failure", "status": "True"})
        );
    }
}
