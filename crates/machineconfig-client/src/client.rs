//! Kubernetes-backed MachineConfig store

use crate::error::StoreError;
use crate::store_trait::MachineConfigStore;
use crds::MachineConfig;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::debug;

/// MachineConfig store over the cluster-scoped `MachineConfig` API
#[derive(Clone)]
pub struct KubeMachineConfigStore {
    api: Api<MachineConfig>,
}

impl KubeMachineConfigStore {
    pub fn new(client: Client) -> Self {
        Self { api: Api::all(client) }
    }
}

#[async_trait::async_trait]
impl MachineConfigStore for KubeMachineConfigStore {
    async fn get(&self, name: &str) -> Result<Option<MachineConfig>, StoreError> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, mc: &MachineConfig) -> Result<MachineConfig, StoreError> {
        let name = object_name(mc)?;
        debug!("Creating MachineConfig {}", name);
        self.api.create(&PostParams::default(), mc)
            .await
            .map_err(|e| classify(name, e))
    }

    async fn update(&self, mc: &MachineConfig) -> Result<MachineConfig, StoreError> {
        let name = object_name(mc)?;
        if mc.metadata.resource_version.is_none() {
            return Err(StoreError::InvalidRequest(format!(
                "MachineConfig {} update requires a resource version",
                name
            )));
        }
        debug!("Replacing MachineConfig {} at resource version {:?}", name, mc.metadata.resource_version);
        self.api.replace(name, &PostParams::default(), mc)
            .await
            .map_err(|e| classify(name, e))
    }
}

fn object_name(mc: &MachineConfig) -> Result<&str, StoreError> {
    mc.metadata.name.as_deref()
        .ok_or_else(|| StoreError::InvalidRequest("MachineConfig has no name".to_string()))
}

fn classify(name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(name.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(name.to_string()),
        other => StoreError::Kube(other),
    }
}
