//! Override selection

use crate::labels::LabelMatcher;
use crate::model::{Override, Pool};

/// Returns the overrides whose selector matches the pool's labels, ordered
/// by name and then creation timestamp.
///
/// The order is the merge order of [`crate::render`]: later entries win, and
/// it does not depend on the order `overrides` was supplied in.
pub fn select(pool: &Pool, overrides: &[Override], matcher: LabelMatcher) -> Vec<Override> {
    let mut matched: Vec<Override> = overrides.iter()
        .filter(|ov| {
            ov.selector.as_ref()
                .is_some_and(|selector| matcher(&pool.labels, selector))
        })
        .cloned()
        .collect();

    matched.sort_by(|a, b| {
        a.name.cmp(&b.name)
            .then_with(|| a.creation_timestamp.cmp(&b.creation_timestamp))
    });
    matched
}
