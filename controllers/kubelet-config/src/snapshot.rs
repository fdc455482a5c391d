//! Read access to pools, overrides and the feature policy.
//!
//! The reconciler reads a fresh snapshot on every attempt, so a retry after a
//! store conflict always sees the latest objects.

use crate::error::SourceError;
use async_trait::async_trait;
use crds::{FeatureGate, KubeletConfig, MachineConfigPool, CLUSTER_FEATURE_GATE_NAME};
use kube::api::ListParams;
use kube::{Api, Client};
use kubelet_render::{FeaturePolicy, Override, Pool};

/// Transport-agnostic source of reconciliation inputs
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// A pool by name; `None` once it has been deleted
    async fn pool(&self, name: &str) -> Result<Option<Pool>, SourceError>;

    async fn pools(&self) -> Result<Vec<Pool>, SourceError>;

    async fn overrides(&self) -> Result<Vec<Override>, SourceError>;

    /// The cluster FeatureGate; `None` if it does not exist
    async fn feature_policy(&self) -> Result<Option<FeaturePolicy>, SourceError>;
}

/// Snapshot source reading straight from the API server
#[derive(Clone)]
pub struct KubeSnapshotSource {
    pools: Api<MachineConfigPool>,
    overrides: Api<KubeletConfig>,
    feature_gates: Api<FeatureGate>,
}

impl KubeSnapshotSource {
    pub fn new(client: Client) -> Self {
        Self {
            pools: Api::all(client.clone()),
            overrides: Api::all(client.clone()),
            feature_gates: Api::all(client),
        }
    }
}

#[async_trait]
impl SnapshotSource for KubeSnapshotSource {
    async fn pool(&self, name: &str) -> Result<Option<Pool>, SourceError> {
        let pool = self.pools.get_opt(name).await?;
        Ok(pool.as_ref().map(Pool::try_from).transpose()?)
    }

    async fn pools(&self) -> Result<Vec<Pool>, SourceError> {
        let list = self.pools.list(&ListParams::default()).await?;
        list.items.iter()
            .map(|pool| Pool::try_from(pool).map_err(SourceError::from))
            .collect()
    }

    async fn overrides(&self) -> Result<Vec<Override>, SourceError> {
        let list = self.overrides.list(&ListParams::default()).await?;
        list.items.iter()
            .map(|kc| Override::try_from(kc).map_err(SourceError::from))
            .collect()
    }

    async fn feature_policy(&self) -> Result<Option<FeaturePolicy>, SourceError> {
        let gate = self.feature_gates.get_opt(CLUSTER_FEATURE_GATE_NAME).await?;
        Ok(gate.as_ref().map(FeaturePolicy::from))
    }
}
