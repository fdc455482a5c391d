//! Domain model
//!
//! Plain snapshots of the Kubernetes objects the renderer reads. They are
//! decoupled from the CRD types so rendering can be exercised without an API
//! server, and converted from the CRDs with `TryFrom`.

use crate::error::RenderError;
use chrono::{DateTime, Utc};
use crds::{FeatureGate, KubeletConfig, LabelSelector, MachineConfigPool};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// A named group of machines sharing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    /// Pool name; also the `<pool>` in generated artifact names
    pub name: String,
    /// Object uid; used by the superseded artifact naming scheme
    pub uid: Option<String>,
    /// Labels matched against override selectors
    pub labels: BTreeMap<String, String>,
    /// Spec generation, bumped on every spec change
    pub generation: i64,
}

impl Pool {
    /// Unlabelled pool at generation 0
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: None,
            labels: BTreeMap::new(),
            generation: 0,
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    #[must_use]
    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }
}

impl TryFrom<&MachineConfigPool> for Pool {
    type Error = RenderError;

    fn try_from(pool: &MachineConfigPool) -> Result<Self, Self::Error> {
        let name = pool.metadata.name.clone()
            .ok_or_else(|| RenderError::InvalidResource("MachineConfigPool missing name".to_string()))?;

        Ok(Self {
            name,
            uid: pool.metadata.uid.clone(),
            labels: pool.metadata.labels.clone().unwrap_or_default(),
            generation: pool.metadata.generation.unwrap_or_default(),
        })
    }
}

/// A named, selector-scoped partial kubelet configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    /// Name of the source `KubeletConfig`; breaks ordering ties
    pub name: String,
    /// `None` matches no pool
    pub selector: Option<LabelSelector>,
    /// Partial `KubeletConfiguration`; must be an object when present
    pub kubelet_config: Option<serde_json::Value>,
    /// Kubelet verbosity, written as `KUBELET_LOG_LEVEL`
    pub log_level: Option<i32>,
    /// Primary ordering key; later overrides win
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Spec generation, echoed as `observedGeneration` in status
    pub generation: Option<i64>,
}

impl Override {
    /// Override with a selector and a partial configuration, no metadata
    pub fn new(name: impl Into<String>, selector: LabelSelector, kubelet_config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            selector: Some(selector),
            kubelet_config: Some(kubelet_config),
            log_level: None,
            creation_timestamp: None,
            generation: None,
        }
    }
}

impl TryFrom<&KubeletConfig> for Override {
    type Error = RenderError;

    fn try_from(kc: &KubeletConfig) -> Result<Self, Self::Error> {
        let name = kc.metadata.name.clone()
            .ok_or_else(|| RenderError::InvalidResource("KubeletConfig missing name".to_string()))?;

        Ok(Self {
            name,
            selector: kc.spec.machine_config_pool_selector.clone(),
            kubelet_config: kc.spec.kubelet_config.clone(),
            log_level: kc.spec.log_level,
            creation_timestamp: creation_time(&kc.metadata),
            generation: kc.metadata.generation,
        })
    }
}

/// Cluster feature set selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeatureSet {
    #[default]
    Default,
    CustomNoUpgrade,
    TechPreviewNoUpgrade,
    /// Unset (empty string) or a value this controller does not know.
    /// Treated like `Default`.
    Unknown(String),
}

impl FeatureSet {
    /// Maps the `featureSet` field; unrecognised values are kept verbatim
    pub fn parse(value: &str) -> Self {
        match value {
            "Default" => Self::Default,
            "CustomNoUpgrade" => Self::CustomNoUpgrade,
            "TechPreviewNoUpgrade" => Self::TechPreviewNoUpgrade,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// The cluster-wide feature policy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeaturePolicy {
    pub feature_set: FeatureSet,
    /// Extra gates enabled under `CustomNoUpgrade`
    pub enabled: Vec<String>,
    /// Extra gates disabled under `CustomNoUpgrade`
    pub disabled: Vec<String>,
}

impl FeaturePolicy {
    /// `CustomNoUpgrade` policy with the given gate lists
    pub fn custom(enabled: &[&str], disabled: &[&str]) -> Self {
        Self {
            feature_set: FeatureSet::CustomNoUpgrade,
            enabled: enabled.iter().map(ToString::to_string).collect(),
            disabled: disabled.iter().map(ToString::to_string).collect(),
        }
    }
}

impl From<&FeatureGate> for FeaturePolicy {
    fn from(gate: &FeatureGate) -> Self {
        let custom = gate.spec.custom_no_upgrade.clone().unwrap_or_default();
        Self {
            feature_set: FeatureSet::parse(&gate.spec.feature_set),
            enabled: custom.enabled,
            disabled: custom.disabled,
        }
    }
}

fn creation_time(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    meta.creation_timestamp.as_ref().map(|ts| ts.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{label_selector, CustomFeatureGates, FeatureGateSpec, KubeletConfigSpec};

    #[test]
    fn test_feature_set_parse() {
        assert_eq!(FeatureSet::parse("Default"), FeatureSet::Default);
        assert_eq!(FeatureSet::parse("CustomNoUpgrade"), FeatureSet::CustomNoUpgrade);
        assert_eq!(FeatureSet::parse("TechPreviewNoUpgrade"), FeatureSet::TechPreviewNoUpgrade);
        assert_eq!(FeatureSet::parse(""), FeatureSet::Unknown(String::new()));
        assert_eq!(FeatureSet::parse("LatencySensitive"), FeatureSet::Unknown("LatencySensitive".to_string()));
    }

    #[test]
    fn test_feature_policy_from_crd() {
        let gate = FeatureGate::new(
            "cluster",
            FeatureGateSpec {
                feature_set: "CustomNoUpgrade".to_string(),
                custom_no_upgrade: Some(CustomFeatureGates {
                    enabled: vec!["CSIMigration".to_string()],
                    disabled: vec!["NodeSwap".to_string()],
                }),
            },
        );

        let policy = FeaturePolicy::from(&gate);
        assert_eq!(policy, FeaturePolicy::custom(&["CSIMigration"], &["NodeSwap"]));
    }

    #[test]
    fn test_override_from_crd_reads_creation_timestamp() {
        let mut kc = KubeletConfig::new(
            "max-pods",
            KubeletConfigSpec {
                machine_config_pool_selector: Some(label_selector("role", "worker")),
                kubelet_config: Some(serde_json::json!({"maxPods": 100})),
                log_level: Some(4),
            },
        );
        kc.metadata = serde_json::from_value::<ObjectMeta>(serde_json::json!({
            "name": "max-pods",
            "generation": 3,
            "creationTimestamp": "2024-05-01T10:00:00Z",
        }))
        .unwrap();

        let ov = Override::try_from(&kc).unwrap();
        assert_eq!(ov.name, "max-pods");
        assert_eq!(ov.generation, Some(3));
        assert_eq!(ov.log_level, Some(4));
        assert_eq!(
            ov.creation_timestamp.map(|ts| ts.to_rfc3339()),
            Some("2024-05-01T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_override_without_creation_timestamp() {
        let kc = KubeletConfig::new("max-pods", KubeletConfigSpec::default());
        let ov = Override::try_from(&kc).unwrap();
        assert_eq!(ov.creation_timestamp, None);
        assert_eq!(ov.selector, None);
    }

    #[test]
    fn test_pool_from_crd_requires_name() {
        let mut pool = MachineConfigPool::new("worker", Default::default());
        pool.metadata.name = None;
        assert!(matches!(Pool::try_from(&pool), Err(RenderError::InvalidResource(_))));
    }
}
