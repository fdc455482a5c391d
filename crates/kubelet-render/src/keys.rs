//! MachineConfig naming
//!
//! The canonical name depends on the pool name only, so every render of a
//! pool targets the same object. The legacy scheme embedded the pool uid; it
//! is kept to find and migrate artifacts created before the rename and is
//! never used to create anything.

use crate::model::Pool;

/// Names under which a pool's artifact may be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKeys {
    /// Name every render is written under
    pub canonical: String,
    /// `None` when the pool has no uid to derive it from
    pub legacy: Option<String>,
}

/// Canonical and legacy artifact names for a pool
pub fn keys_for(pool: &Pool) -> ArtifactKeys {
    ArtifactKeys {
        canonical: canonical_key(&pool.name),
        legacy: pool.uid.as_deref().map(|uid| legacy_key(&pool.name, uid)),
    }
}

/// `99-<pool>-generated-kubelet`
pub fn canonical_key(pool_name: &str) -> String {
    format!("99-{}-generated-kubelet", pool_name)
}

/// `99-<pool>-<uid>-kubelet`, the superseded uid-based name
pub fn legacy_key(pool_name: &str, pool_uid: &str) -> String {
    format!("99-{}-{}-kubelet", pool_name, pool_uid)
}
