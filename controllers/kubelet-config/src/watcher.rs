//! Kubernetes resource watchers.
//!
//! Watch events are turned into pool names and handed to the dispatcher;
//! nothing is reconciled on the watcher task itself.
//!
//! - MachineConfigPool: the pool itself
//! - KubeletConfig: every pool, since selectors can move between pools
//! - FeatureGate `cluster`: every pool
//! - generated MachineConfig: the pool named by its role label, so manual
//!   edits are healed

use crate::dispatcher::DispatchHandle;
use crate::error::ControllerError;
use crate::snapshot::SnapshotSource;
use crds::{FeatureGate, KubeletConfig, MachineConfig, MachineConfigPool, CLUSTER_FEATURE_GATE_NAME, ROLE_LABEL};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Last seen `metadata.generation` per object.
///
/// Status patches do not bump the generation, so filtering on it keeps the
/// controller's own status writes from triggering reconciliations.
#[derive(Debug, Default)]
pub struct GenerationCache {
    seen: HashMap<String, Option<i64>>,
}

impl GenerationCache {
    /// Records `generation` and reports whether it differs from the last one
    pub fn changed(&mut self, name: &str, generation: Option<i64>) -> bool {
        self.seen.insert(name.to_string(), generation) != Some(generation)
    }

    pub fn forget(&mut self, name: &str) {
        self.seen.remove(name);
    }

    /// Drops every entry not in `present`, returning how many were dropped
    pub fn retain_only(&mut self, present: &HashSet<String>) -> usize {
        let before = self.seen.len();
        self.seen.retain(|name, _| present.contains(name));
        before - self.seen.len()
    }
}

/// Tracks whether a relist after a watch restart saw anything new.
///
/// Objects deleted while the watch was down never produce a `Delete` event,
/// so the names listed are compared against the generation cache when the
/// relist ends.
///
/// The first list is skipped: the pool watcher queues every pool on startup.
#[derive(Debug, Default)]
pub struct Relist {
    synced: bool,
    dirty: bool,
    listed: HashSet<String>,
}

impl Relist {
    /// Records one listed object against the cache
    pub fn observe(&mut self, generations: &mut GenerationCache, name: &str, generation: Option<i64>) {
        self.dirty |= generations.changed(name, generation);
        self.listed.insert(name.to_string());
    }

    /// Ends a relist; `true` if pools need to be queued
    pub fn finish(&mut self, generations: &mut GenerationCache) -> bool {
        let vanished = generations.retain_only(&self.listed);
        if vanished > 0 {
            debug!("{} objects disappeared while the watch was down", vanished);
        }

        let requeue = self.synced && (self.dirty || vanished > 0);
        self.synced = true;
        self.dirty = false;
        self.listed.clear();
        requeue
    }
}

/// Pool a generated MachineConfig belongs to
pub fn owning_pool(mc: &MachineConfig) -> Option<&str> {
    mc.labels().get(ROLE_LABEL).map(String::as_str)
}

/// Watches Kubernetes resources and queues pools for reconciliation.
pub struct Watcher {
    queue: DispatchHandle,
    source: Arc<dyn SnapshotSource>,
    client: Client,
}

impl Watcher {
    pub fn new(queue: DispatchHandle, source: Arc<dyn SnapshotSource>, client: Client) -> Self {
        Self { queue, source, client }
    }

    /// Starts watching MachineConfigPool resources.
    pub async fn watch_pools(&self) -> Result<(), ControllerError> {
        info!("Starting MachineConfigPool watcher");
        let api: Api<MachineConfigPool> = Api::all(self.client.clone());
        let mut stream = watcher(api, watcher::Config::default()).default_backoff().boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(pool)) | Ok(watcher::Event::InitApply(pool)) => {
                    debug!("MachineConfigPool applied: {}", pool.name_any());
                    self.queue.enqueue(pool.name_any());
                }
                Ok(watcher::Event::Delete(pool)) => {
                    info!("MachineConfigPool deleted: {}", pool.name_any());
                }
                Ok(watcher::Event::Init) => debug!("MachineConfigPool watcher initialized"),
                Ok(watcher::Event::InitDone) => info!("MachineConfigPool watcher initialization complete"),
                Err(e) => warn!("MachineConfigPool watch error: {}", e),
            }
        }
        Ok(())
    }

    /// Starts watching KubeletConfig resources.
    pub async fn watch_overrides(&self) -> Result<(), ControllerError> {
        info!("Starting KubeletConfig watcher");
        let api: Api<KubeletConfig> = Api::all(self.client.clone());
        let mut stream = watcher(api, watcher::Config::default()).default_backoff().boxed();
        let mut generations = GenerationCache::default();
        let mut relist = Relist::default();

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(kc)) => {
                    let name = kc.name_any();
                    if generations.changed(&name, kc.metadata.generation) {
                        info!("KubeletConfig applied: {}", name);
                        self.enqueue_all_pools("KubeletConfig change").await;
                    } else {
                        debug!("KubeletConfig {} unchanged (status only)", name);
                    }
                }
                Ok(watcher::Event::Delete(kc)) => {
                    let name = kc.name_any();
                    info!("KubeletConfig deleted: {}", name);
                    generations.forget(&name);
                    self.enqueue_all_pools("KubeletConfig deletion").await;
                }
                Ok(watcher::Event::Init) => debug!("KubeletConfig watcher initialized"),
                Ok(watcher::Event::InitApply(kc)) => {
                    relist.observe(&mut generations, &kc.name_any(), kc.metadata.generation);
                }
                Ok(watcher::Event::InitDone) => {
                    if relist.finish(&mut generations) {
                        self.enqueue_all_pools("KubeletConfig relist").await;
                    }
                }
                Err(e) => warn!("KubeletConfig watch error: {}", e),
            }
        }
        Ok(())
    }

    /// Starts watching the cluster FeatureGate.
    pub async fn watch_feature_gates(&self) -> Result<(), ControllerError> {
        info!("Starting FeatureGate watcher");
        let api: Api<FeatureGate> = Api::all(self.client.clone());
        let config = watcher::Config::default().fields(&format!("metadata.name={}", CLUSTER_FEATURE_GATE_NAME));
        let mut stream = watcher(api, config).default_backoff().boxed();
        let mut generations = GenerationCache::default();
        let mut relist = Relist::default();

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(gate)) => {
                    if generations.changed(&gate.name_any(), gate.metadata.generation) {
                        info!("FeatureGate {} changed", gate.name_any());
                        self.enqueue_all_pools("FeatureGate change").await;
                    }
                }
                Ok(watcher::Event::InitApply(gate)) => {
                    relist.observe(&mut generations, &gate.name_any(), gate.metadata.generation);
                }
                Ok(watcher::Event::Delete(gate)) => {
                    warn!("FeatureGate {} deleted; pools are left as rendered", gate.name_any());
                    generations.forget(&gate.name_any());
                }
                Ok(watcher::Event::InitDone) => {
                    if relist.finish(&mut generations) {
                        self.enqueue_all_pools("FeatureGate relist").await;
                    }
                }
                Ok(watcher::Event::Init) => {}
                Err(e) => warn!("FeatureGate watch error: {}", e),
            }
        }
        Ok(())
    }

    /// Starts watching generated MachineConfig resources.
    pub async fn watch_machine_configs(&self) -> Result<(), ControllerError> {
        info!("Starting MachineConfig watcher");
        let api: Api<MachineConfig> = Api::all(self.client.clone());
        let config = watcher::Config::default().labels(ROLE_LABEL);
        let mut stream = watcher(api, config).default_backoff().boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(mc)) | Ok(watcher::Event::Delete(mc)) => {
                    if let Some(pool) = owning_pool(&mc) {
                        debug!("MachineConfig {} changed, queueing pool {}", mc.name_any(), pool);
                        self.queue.enqueue(pool);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("MachineConfig watch error: {}", e),
            }
        }
        Ok(())
    }

    async fn enqueue_all_pools(&self, reason: &str) {
        match self.source.pools().await {
            Ok(pools) => {
                debug!("{}: queueing {} pools", reason, pools.len());
                for pool in pools {
                    self.queue.enqueue(pool.name);
                }
            }
            Err(e) => warn!("{}: failed to list MachineConfigPools: {}", reason, e),
        }
    }
}
