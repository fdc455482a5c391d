//! # Feature Gate Resolution
//!
//! Turns the cluster `FeatureGate` policy into the feature-gate map written
//! into every pool's kubelet configuration.
//!
//! The baseline ([`DEFAULT_FEATURE_GATES`]) must stay identical to the
//! `featureGates` block of `templates/kubelet.yaml`; the drift test in
//! `tests/feature_gate_drift.rs` enforces it.

use crate::error::RenderError;
use crate::model::{FeaturePolicy, FeatureSet};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Feature gate name -> enabled.
///
/// A `BTreeMap` so serialization is key-sorted and byte-stable.
pub type FeatureMap = BTreeMap<String, bool>;

/// Default feature gates shipped with the base template
pub const DEFAULT_FEATURE_GATES: &[(&str, bool)] = &[
    ("APIPriorityAndFairness", true),
    ("DownwardAPIHugePages", true),
    ("LegacyNodeRoleBehavior", false),
    ("NodeDisruptionExclusion", true),
    ("RotateKubeletServerCertificate", true),
    ("SCTPSupport", true),
    ("ServiceNodeExclusion", true),
    ("SupportPodPidsLimit", true),
];

/// Gates enabled by `TechPreviewNoUpgrade`, on top of the defaults
pub const TECH_PREVIEW_FEATURE_GATES: &[(&str, bool)] = &[
    ("BuildCSIVolumes", true),
    ("CSIDriverSharedResource", true),
    ("InsightsConfigAPI", true),
    ("NodeSwap", true),
];

/// The static feature sets a policy can select from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSets {
    /// Baseline used by `Default`, `CustomNoUpgrade` and unknown sets
    pub default: FeatureMap,
    /// Baseline plus the tech preview gates
    pub tech_preview: FeatureMap,
}

impl FeatureSets {
    /// Feature sets compiled into this crate
    pub fn builtin() -> Self {
        let default = to_map(DEFAULT_FEATURE_GATES);
        let mut tech_preview = default.clone();
        tech_preview.extend(to_map(TECH_PREVIEW_FEATURE_GATES));
        Self { default, tech_preview }
    }
}

impl Default for FeatureSets {
    fn default() -> Self {
        Self::builtin()
    }
}

fn to_map(gates: &[(&str, bool)]) -> FeatureMap {
    gates.iter().map(|(name, enabled)| (name.to_string(), *enabled)).collect()
}

/// Result of resolving a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFeatures {
    /// Effective gates written into the kubelet configuration
    pub gates: FeatureMap,
    /// Custom gate names unknown to the baseline. They are still written out
    /// so newer kubelets can pick them up.
    pub unrecognized: Vec<String>,
}

/// Resolves the effective feature-gate map for a policy.
///
/// Fails only for `CustomNoUpgrade` policies naming a gate in both the
/// enabled and disabled lists.
pub fn resolve(policy: &FeaturePolicy, sets: &FeatureSets) -> Result<ResolvedFeatures, RenderError> {
    match &policy.feature_set {
        FeatureSet::Default => Ok(baseline(sets)),
        FeatureSet::Unknown(name) => {
            if !name.is_empty() {
                warn!("Unrecognized feature set {:?}, falling back to the default feature gates", name);
            }
            Ok(baseline(sets))
        }
        FeatureSet::TechPreviewNoUpgrade => Ok(ResolvedFeatures {
            gates: sets.tech_preview.clone(),
            unrecognized: Vec::new(),
        }),
        FeatureSet::CustomNoUpgrade => resolve_custom(policy, sets),
    }
}

fn baseline(sets: &FeatureSets) -> ResolvedFeatures {
    ResolvedFeatures {
        gates: sets.default.clone(),
        unrecognized: Vec::new(),
    }
}

fn resolve_custom(policy: &FeaturePolicy, sets: &FeatureSets) -> Result<ResolvedFeatures, RenderError> {
    let enabled: BTreeSet<&str> = policy.enabled.iter().map(String::as_str).collect();
    let disabled: BTreeSet<&str> = policy.disabled.iter().map(String::as_str).collect();

    if let Some(feature) = enabled.intersection(&disabled).next() {
        return Err(RenderError::ConflictingOverride {
            feature: feature.to_string(),
        });
    }

    let mut gates = sets.default.clone();
    let mut unrecognized = Vec::new();

    let forced = enabled.iter().map(|name| (*name, true))
        .chain(disabled.iter().map(|name| (*name, false)));
    for (name, value) in forced {
        if !sets.default.contains_key(name) {
            unrecognized.push(name.to_string());
        }
        gates.insert(name.to_string(), value);
    }

    if !unrecognized.is_empty() {
        unrecognized.sort();
        warn!("CustomNoUpgrade policy sets unrecognized feature gates: {}", unrecognized.join(", "));
    }

    Ok(ResolvedFeatures { gates, unrecognized })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_returns_baseline() {
        let sets = FeatureSets::builtin();
        let resolved = resolve(&FeaturePolicy::default(), &sets).unwrap();
        assert_eq!(resolved.gates, sets.default);
        assert!(resolved.unrecognized.is_empty());
    }

    #[test]
    fn test_unset_and_unknown_fall_back_to_baseline() {
        let sets = FeatureSets::builtin();
        for name in ["", "SomethingNew"] {
            let policy = FeaturePolicy {
                feature_set: FeatureSet::Unknown(name.to_string()),
                ..Default::default()
            };
            assert_eq!(resolve(&policy, &sets).unwrap().gates, sets.default, "feature set {name:?}");
        }
    }

    #[test]
    fn test_unknown_mode_ignores_custom_lists() {
        let sets = FeatureSets::builtin();
        let policy = FeaturePolicy {
            feature_set: FeatureSet::Unknown(String::new()),
            enabled: vec!["CSIMigration".to_string()],
            disabled: vec!["CSIMigration".to_string()],
        };
        assert_eq!(resolve(&policy, &sets).unwrap().gates, sets.default);
    }

    #[test]
    fn test_tech_preview_is_superset_of_default() {
        let sets = FeatureSets::builtin();
        let policy = FeaturePolicy {
            feature_set: FeatureSet::TechPreviewNoUpgrade,
            ..Default::default()
        };
        let gates = resolve(&policy, &sets).unwrap().gates;

        assert_eq!(gates, sets.tech_preview);
        assert_eq!(gates.get("NodeSwap"), Some(&true));
        for name in sets.default.keys() {
            assert!(gates.contains_key(name), "tech preview dropped {name}");
        }
    }

    #[test]
    fn test_custom_enables_and_disables() {
        let sets = FeatureSets::builtin();
        let policy = FeaturePolicy::custom(&["LegacyNodeRoleBehavior"], &["SCTPSupport"]);
        let resolved = resolve(&policy, &sets).unwrap();

        assert_eq!(resolved.gates.get("LegacyNodeRoleBehavior"), Some(&true));
        assert_eq!(resolved.gates.get("SCTPSupport"), Some(&false));
        assert_eq!(resolved.gates.get("SupportPodPidsLimit"), Some(&true));
        assert_eq!(resolved.gates.len(), sets.default.len());
        assert!(resolved.unrecognized.is_empty());
    }

    #[test]
    fn test_custom_unrecognized_gate_is_kept_and_reported() {
        let sets = FeatureSets::builtin();
        let policy = FeaturePolicy::custom(&["CSIMigration"], &[]);
        let resolved = resolve(&policy, &sets).unwrap();

        assert_eq!(resolved.gates.get("CSIMigration"), Some(&true));
        assert_eq!(resolved.gates.len(), sets.default.len() + 1);
        assert_eq!(resolved.unrecognized, vec!["CSIMigration".to_string()]);
    }

    #[test]
    fn test_custom_conflict_is_an_error() {
        let sets = FeatureSets::builtin();
        let policy = FeaturePolicy::custom(&["CSIMigration", "NodeSwap"], &["NodeSwap", "CSIMigration"]);

        match resolve(&policy, &sets) {
            Err(RenderError::ConflictingOverride { feature }) => assert_eq!(feature, "CSIMigration"),
            other => panic!("expected ConflictingOverride, got {other:?}"),
        }
    }

    #[test]
    fn test_serialization_is_key_sorted() {
        let sets = FeatureSets::builtin();
        let policy = FeaturePolicy::custom(&["ZetaGate", "AlphaGate"], &[]);
        let gates = resolve(&policy, &sets).unwrap().gates;

        let first = serde_json::to_string(&gates).unwrap();
        let second = serde_json::to_string(&resolve(&policy, &sets).unwrap().gates).unwrap();
        assert_eq!(first, second);

        let keys: Vec<&String> = gates.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(first.starts_with("{\"APIPriorityAndFairness\":true,\"AlphaGate\":true"));
    }
}
