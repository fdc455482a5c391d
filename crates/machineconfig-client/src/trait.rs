//! MachineConfigStore trait for mocking
//!
//! The Kubernetes-backed store implements this trait; tests use
//! `MockMachineConfigStore` behind the `test-util` feature.

use crate::error::StoreError;
use crds::MachineConfig;

/// Cluster-wide MachineConfig storage
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait MachineConfigStore: Send + Sync {
    /// Fetch a MachineConfig by name. `Ok(None)` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<MachineConfig>, StoreError>;

    /// Create a MachineConfig. Fails with `Conflict` if the name is taken.
    async fn create(&self, mc: &MachineConfig) -> Result<MachineConfig, StoreError>;

    /// Replace a MachineConfig at the resource version it carries. Fails with
    /// `Conflict` if the stored object has moved on, `NotFound` if it is gone.
    async fn update(&self, mc: &MachineConfig) -> Result<MachineConfig, StoreError>;
}
