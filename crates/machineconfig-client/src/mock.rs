//! Mock MachineConfigStore for unit testing
//!
//! Stores MachineConfigs in memory, assigns resource versions like the API
//! server does and records every call so tests can assert on the exact
//! sequence of store operations.

use crate::error::StoreError;
use crate::store_trait::MachineConfigStore;
use crds::MachineConfig;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A recorded store call, by object name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(String),
    Create(String),
    Update(String),
}

/// Mock MachineConfigStore for testing
#[derive(Clone, Default)]
pub struct MockMachineConfigStore {
    objects: Arc<Mutex<BTreeMap<String, MachineConfig>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    // Mutations that will fail with Conflict before touching the store
    injected_conflicts: Arc<Mutex<usize>>,
    mutations: Arc<Mutex<usize>>,
    next_version: Arc<Mutex<u64>>,
}

impl MockMachineConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object to the mock store (for test setup, not recorded)
    pub fn insert(&self, mut mc: MachineConfig) {
        let Some(name) = mc.metadata.name.clone() else {
            panic!("MachineConfig in mock store must have a name");
        };
        mc.metadata.resource_version = Some(self.next_version());
        self.objects.lock().unwrap().insert(name, mc);
    }

    /// Current stored object
    pub fn object(&self, name: &str) -> Option<MachineConfig> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    /// Names of all stored objects, sorted
    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Names passed to `create`, including failed attempts
    pub fn creates(&self) -> Vec<String> {
        self.calls().into_iter()
            .filter_map(|call| match call {
                StoreCall::Create(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names passed to `update`, including failed attempts
    pub fn updates(&self) -> Vec<String> {
        self.calls().into_iter()
            .filter_map(|call| match call {
                StoreCall::Update(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Number of creates and updates that changed the store
    pub fn mutation_count(&self) -> usize {
        *self.mutations.lock().unwrap()
    }

    /// Make the next `count` creates or updates fail with `Conflict`
    pub fn inject_conflicts(&self, count: usize) {
        *self.injected_conflicts.lock().unwrap() = count;
    }

    fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_injected_conflict(&self) -> bool {
        let mut remaining = self.injected_conflicts.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }

    fn store(&self, name: String, mut mc: MachineConfig) -> MachineConfig {
        mc.metadata.resource_version = Some(self.next_version());
        self.objects.lock().unwrap().insert(name, mc.clone());
        *self.mutations.lock().unwrap() += 1;
        mc
    }
}

fn object_name(mc: &MachineConfig) -> Result<String, StoreError> {
    mc.metadata.name.clone()
        .ok_or_else(|| StoreError::InvalidRequest("MachineConfig has no name".to_string()))
}

#[async_trait::async_trait]
impl MachineConfigStore for MockMachineConfigStore {
    async fn get(&self, name: &str) -> Result<Option<MachineConfig>, StoreError> {
        self.record(StoreCall::Get(name.to_string()));
        Ok(self.object(name))
    }

    async fn create(&self, mc: &MachineConfig) -> Result<MachineConfig, StoreError> {
        let name = object_name(mc)?;
        self.record(StoreCall::Create(name.clone()));

        if self.take_injected_conflict() || self.objects.lock().unwrap().contains_key(&name) {
            return Err(StoreError::Conflict(name));
        }
        Ok(self.store(name, mc.clone()))
    }

    async fn update(&self, mc: &MachineConfig) -> Result<MachineConfig, StoreError> {
        let name = object_name(mc)?;
        self.record(StoreCall::Update(name.clone()));

        let Some(expected) = mc.metadata.resource_version.clone() else {
            return Err(StoreError::InvalidRequest(format!("MachineConfig {} has no resource version", name)));
        };
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict(name));
        }

        let current = self.object(&name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        if current.metadata.resource_version.as_deref() != Some(expected.as_str()) {
            return Err(StoreError::Conflict(name));
        }
        Ok(self.store(name, mc.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::MachineConfigSpec;
    use serde_json::json;

    fn mc(name: &str, config: serde_json::Value) -> MachineConfig {
        MachineConfig::new(name, MachineConfigSpec { config })
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MockMachineConfigStore::new();
        let created = store.create(&mc("99-worker-generated-kubelet", json!({"a": 1}))).await.unwrap();

        assert!(created.metadata.resource_version.is_some());
        let fetched = store.get("99-worker-generated-kubelet").await.unwrap().unwrap();
        assert_eq!(fetched.spec.config, json!({"a": 1}));
        assert_eq!(store.mutation_count(), 1);
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Create("99-worker-generated-kubelet".to_string()),
                StoreCall::Get("99-worker-generated-kubelet".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_existing_is_conflict() {
        let store = MockMachineConfigStore::new();
        store.insert(mc("taken", json!({})));

        let err = store.create(&mc("taken", json!({"a": 1}))).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_update_is_conflict() {
        let store = MockMachineConfigStore::new();
        store.insert(mc("pool", json!({"v": 1})));
        let stale = store.get("pool").await.unwrap().unwrap();

        let mut fresh = stale.clone();
        fresh.spec.config = json!({"v": 2});
        store.update(&fresh).await.unwrap();

        let mut late = stale;
        late.spec.config = json!({"v": 3});
        assert!(store.update(&late).await.unwrap_err().is_conflict());
        assert_eq!(store.object("pool").unwrap().spec.config, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MockMachineConfigStore::new();
        let mut gone = mc("gone", json!({}));
        gone.metadata.resource_version = Some("1".to_string());

        assert!(matches!(store.update(&gone).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MockMachineConfigStore::new();
        store.inject_conflicts(1);

        assert!(store.create(&mc("pool", json!({}))).await.unwrap_err().is_conflict());
        assert!(store.create(&mc("pool", json!({}))).await.is_ok());
        assert_eq!(store.creates(), vec!["pool".to_string(), "pool".to_string()]);
    }
}
