//! Payload encoding
//!
//! Encodes a rendered kubelet configuration into the Ignition document stored
//! in a MachineConfig, and decodes it back for comparisons.

use crate::error::RenderError;
use crate::render::RenderedConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};

/// Path of the kubelet configuration file on the node
pub const KUBELET_CONFIG_PATH: &str = "/etc/kubernetes/kubelet.conf";

/// Ignition spec version of generated payloads
pub const IGNITION_VERSION: &str = "3.2.0";

/// Drop-in carrying the kubelet log level
pub const LOGGING_DROPIN: &str = "20-logging.conf";

const DATA_URL_PREFIX: &str = "data:text/plain;charset=utf-8;base64,";

/// Mode 0644
const FILE_MODE: u32 = 0o644;

/// Rebuilds a JSON value with every object's keys in sorted order.
///
/// Keys are inserted in sorted order, so the output is sorted whether or not
/// `serde_json` preserves insertion order.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Key-sorted JSON bytes of a kubelet configuration document
pub fn encode_kubelet_config(document: &Value) -> Result<Vec<u8>, RenderError> {
    Ok(serde_json::to_vec(&sort_keys(document))?)
}

/// Inline `data:` URL for file contents
pub fn data_url(contents: &[u8]) -> String {
    format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(contents))
}

/// Inverse of [`data_url`]
pub fn decode_data_url(source: &str) -> Result<Vec<u8>, RenderError> {
    let encoded = source.strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| RenderError::Encoding(format!("unsupported data URL: {}", truncate(source))))?;
    STANDARD.decode(encoded)
        .map_err(|e| RenderError::Encoding(format!("invalid base64 in data URL: {}", e)))
}

/// Builds the Ignition document for a rendered config.
///
/// Returns the document and the `data:` URL of the kubelet file it embeds.
pub fn encode_ignition(config: &RenderedConfig) -> Result<(Value, String), RenderError> {
    let source = data_url(&encode_kubelet_config(&config.kubelet)?);

    let mut ignition = json!({
        "ignition": { "version": IGNITION_VERSION },
        "storage": {
            "files": [{
                "path": KUBELET_CONFIG_PATH,
                "mode": FILE_MODE,
                "overwrite": true,
                "contents": { "source": source },
            }]
        }
    });

    if let Some(level) = config.log_level {
        ignition["systemd"] = json!({
            "units": [{
                "name": "kubelet.service",
                "dropins": [{
                    "name": LOGGING_DROPIN,
                    "contents": format!("[Service]\nEnvironment=\"KUBELET_LOG_LEVEL={}\"\n", level),
                }]
            }]
        });
    }

    Ok((sort_keys(&ignition), source))
}

/// Extracts the kubelet configuration document from an Ignition payload.
///
/// `Ok(None)` when the payload carries no kubelet file.
pub fn decode_kubelet_config(ignition: &Value) -> Result<Option<Value>, RenderError> {
    let files = ignition.pointer("/storage/files")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let Some(file) = files.iter().find(|f| f.get("path").and_then(Value::as_str) == Some(KUBELET_CONFIG_PATH)) else {
        return Ok(None);
    };

    let source = file.pointer("/contents/source")
        .and_then(Value::as_str)
        .ok_or_else(|| RenderError::Encoding(format!("{} has no contents source", KUBELET_CONFIG_PATH)))?;

    let bytes = decode_data_url(source)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(40) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
