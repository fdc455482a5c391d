//! Kubelet configuration rendering
//!
//! Merges the base template, the resolved feature gates and the matched
//! overrides into the final kubelet configuration document of a pool.

use crate::encoder::sort_keys;
use crate::error::RenderError;
use crate::features::FeatureMap;
use crate::model::{Override, Pool};
use crate::template::BaseTemplate;
use serde_json::{Map, Value};
use tracing::debug;

/// Fields an override may never set. `featureGates` is owned by the
/// FeatureGate policy; the others are cluster-wide settings.
pub const PROTECTED_FIELDS: &[&str] = &[
    "cgroupDriver",
    "clusterDNS",
    "clusterDomain",
    "featureGates",
    "staticPodPath",
];

/// Highest kubelet verbosity accepted from an override
pub const MAX_LOG_LEVEL: i32 = 10;

/// Rendered configuration for one pool
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedConfig {
    /// Complete, key-sorted `KubeletConfiguration` document
    pub kubelet: Value,
    /// `KUBELET_LOG_LEVEL` for the kubelet unit, when any override sets it
    pub log_level: Option<i32>,
}

/// Renders a pool's kubelet configuration.
///
/// `overrides` must already be in selector order. Each override replaces
/// top-level fields of the document and later overrides win. Every override
/// is validated before any is applied, so a bad override fails the whole
/// render with [`RenderError::RenderFailed`].
pub fn render(
    pool: &Pool,
    gates: &FeatureMap,
    overrides: &[Override],
    base: &BaseTemplate,
) -> Result<RenderedConfig, RenderError> {
    let patches = overrides.iter()
        .map(validate_override)
        .collect::<Result<Vec<_>, _>>()?;

    let mut document = match base.document() {
        Value::Object(map) => map.clone(),
        _ => return Err(RenderError::Template("kubelet template is not a mapping".to_string())),
    };
    document.insert("featureGates".to_string(), serde_json::to_value(gates)?);

    let mut log_level = None;
    for (ov, patch) in overrides.iter().zip(patches) {
        debug!("Applying KubeletConfig {} to pool {} ({} fields)", ov.name, pool.name, patch.len());
        for (field, value) in patch {
            document.insert(field, value);
        }
        if ov.log_level.is_some() {
            log_level = ov.log_level;
        }
    }

    Ok(RenderedConfig {
        kubelet: sort_keys(&Value::Object(document)),
        log_level,
    })
}

fn validate_override(ov: &Override) -> Result<Map<String, Value>, RenderError> {
    let patch = match &ov.kubelet_config {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(RenderError::render_failed(
                &ov.name,
                format!("kubeletConfig must be an object, got {}", json_type(other)),
            ));
        }
    };

    if let Some(field) = PROTECTED_FIELDS.iter().find(|field| patch.contains_key(**field)) {
        return Err(RenderError::render_failed(
            &ov.name,
            format!("{} is not allowed to be set", field),
        ));
    }

    if let Some(level) = ov.log_level {
        if !(0..=MAX_LOG_LEVEL).contains(&level) {
            return Err(RenderError::render_failed(
                &ov.name,
                format!("logLevel {} is outside 0..={}", level, MAX_LOG_LEVEL),
            ));
        }
    }

    Ok(patch)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
