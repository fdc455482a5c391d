//! Label selector matching

use crds::LabelSelector;
use kube::core::{Selector, SelectorExt};
use std::collections::BTreeMap;
use tracing::warn;

/// Decides whether a label set satisfies a selector.
///
/// The selector step takes the matcher as a parameter so callers can swap in
/// a different implementation; [`selector_matches`] is the standard one.
pub type LabelMatcher = fn(&BTreeMap<String, String>, &LabelSelector) -> bool;

/// Kubernetes label selector semantics: every `matchLabels` pair and every
/// `matchExpressions` requirement must hold. An empty selector matches
/// everything; a selector that does not parse matches nothing.
pub fn selector_matches(labels: &BTreeMap<String, String>, selector: &LabelSelector) -> bool {
    match Selector::try_from(selector.clone()) {
        Ok(parsed) => parsed.matches(labels),
        Err(e) => {
            warn!("Ignoring invalid label selector: {}", e);
            false
        }
    }
}
