//! MachineConfig Store Client
//!
//! Read and write access to the MachineConfig objects that hold each pool's
//! rendered kubelet configuration.
//!
//! The reconciler only talks to the [`MachineConfigStore`] trait. Writes are
//! optimistic: an update carries the resource version it was read at, and a
//! concurrent writer surfaces as [`StoreError::Conflict`] rather than a lost
//! update.
//!
//! # Example
//!
//! ```no_run
//! use machineconfig_client::{KubeMachineConfigStore, MachineConfigStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeMachineConfigStore::new(client);
//!
//! if let Some(mc) = store.get("99-worker-generated-kubelet").await? {
//!     println!("resource version {:?}", mc.metadata.resource_version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeMachineConfigStore;
pub use error::StoreError;
pub use store_trait::MachineConfigStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockMachineConfigStore, StoreCall};
