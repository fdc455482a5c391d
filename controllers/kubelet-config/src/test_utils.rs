//! Test utilities for unit testing the reconciler
//!
//! An in-memory snapshot source plus helpers for building pools, overrides
//! and reconcilers wired to the mock MachineConfig store.

use crate::error::SourceError;
use crate::reconciler::Reconciler;
use crate::snapshot::SnapshotSource;
use async_trait::async_trait;
use crds::label_selector;
use kubelet_render::{
    selector_matches, BaseTemplate, FeaturePolicy, FeatureSets, Override, Platform, Pool,
    TemplateContext,
};
use machineconfig_client::MockMachineConfigStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Label used by test pools and override selectors
pub const POOL_LABEL: &str = "pools.dcops.microscaler.io/name";

/// Mutable in-memory snapshot source
#[derive(Default)]
pub struct StaticSnapshot {
    pools: Mutex<Vec<Pool>>,
    overrides: Mutex<Vec<Override>>,
    policy: Mutex<Option<FeaturePolicy>>,
}

impl StaticSnapshot {
    /// A snapshot with the default feature policy and no pools
    pub fn new() -> Self {
        let snapshot = Self::default();
        snapshot.set_policy(Some(FeaturePolicy::default()));
        snapshot
    }

    pub fn add_pool(&self, pool: Pool) {
        self.pools.lock().unwrap().push(pool);
    }

    pub fn remove_pool(&self, name: &str) {
        self.pools.lock().unwrap().retain(|p| p.name != name);
    }

    pub fn add_override(&self, ov: Override) {
        self.overrides.lock().unwrap().push(ov);
    }

    pub fn set_policy(&self, policy: Option<FeaturePolicy>) {
        *self.policy.lock().unwrap() = policy;
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshot {
    async fn pool(&self, name: &str) -> Result<Option<Pool>, SourceError> {
        Ok(self.pools.lock().unwrap().iter().find(|p| p.name == name).cloned())
    }

    async fn pools(&self) -> Result<Vec<Pool>, SourceError> {
        Ok(self.pools.lock().unwrap().clone())
    }

    async fn overrides(&self) -> Result<Vec<Override>, SourceError> {
        Ok(self.overrides.lock().unwrap().clone())
    }

    async fn feature_policy(&self) -> Result<Option<FeaturePolicy>, SourceError> {
        Ok(self.policy.lock().unwrap().clone())
    }
}

/// Pool labelled with its own name, carrying a uid
pub fn create_test_pool(name: &str) -> Pool {
    Pool::new(name)
        .with_uid(format!("{}-uid", name))
        .with_label(POOL_LABEL, name)
        .with_generation(1)
}

/// Override selecting the pool named `pool`
pub fn create_test_override(name: &str, pool: &str, config: serde_json::Value) -> Override {
    Override::new(name, label_selector(POOL_LABEL, pool), config)
}

pub fn test_template() -> Arc<BaseTemplate> {
    Arc::new(
        BaseTemplate::load(&TemplateContext::new(Platform::None, "172.30.0.10"))
            .expect("embedded template must load"),
    )
}

/// Reconciler over `snapshot` and `store` with zero conflict delay
pub fn create_test_reconciler(snapshot: Arc<StaticSnapshot>, store: MockMachineConfigStore) -> Reconciler {
    Reconciler::new(
        snapshot,
        Arc::new(store),
        test_template(),
        Arc::new(FeatureSets::builtin()),
        selector_matches,
    )
    .with_conflict_retries(3, Duration::ZERO)
}
