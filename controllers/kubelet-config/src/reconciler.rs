//! Reconciliation engine.
//!
//! Brings one pool's generated MachineConfig in line with the current
//! FeatureGate policy and the KubeletConfigs selecting the pool.
//!
//! Each attempt reads a fresh snapshot, renders the artifact and then:
//! 1. canonical object present: no-op when the payload matches, otherwise an
//!    optimistic update at the observed resource version
//! 2. canonical absent, legacy present: create the canonical object from the
//!    fresh render and leave the legacy one for garbage collection
//! 3. neither present: create the canonical object
//!
//! A store conflict restarts the attempt from a fresh read, up to the
//! configured limit. Callers must not run two reconciliations of the same
//! pool concurrently; the dispatcher guarantees that.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::snapshot::SnapshotSource;
use crds::CLUSTER_FEATURE_GATE_NAME;
use kubelet_render::{
    build_artifact, features, render, select, BaseTemplate, FeatureSets, LabelMatcher, Override,
    RenderedArtifact,
};
use machineconfig_client::{MachineConfigStore, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a reconciliation did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Canonical artifact already up to date
    Unchanged,
    /// Canonical artifact rewritten
    Updated,
    /// Canonical artifact created for the first time
    Created,
    /// Canonical artifact created next to a legacy one
    Migrated { legacy: String },
    /// Pool or FeatureGate missing; nothing rendered
    Skipped,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Updated => "updated",
            Self::Created => "created",
            Self::Migrated { .. } => "migrated",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub pool: String,
    pub outcome: ReconcileOutcome,
    /// Overrides applied, in selector order
    pub matched_overrides: Vec<Override>,
}

impl ReconcileReport {
    fn skipped(pool: &str) -> Self {
        Self {
            pool: pool.to_string(),
            outcome: ReconcileOutcome::Skipped,
            matched_overrides: Vec::new(),
        }
    }

    pub fn override_names(&self) -> Vec<&str> {
        self.matched_overrides.iter().map(|ov| ov.name.as_str()).collect()
    }
}

/// Reconciles pools against the MachineConfig store.
pub struct Reconciler {
    source: Arc<dyn SnapshotSource>,
    store: Arc<dyn MachineConfigStore>,
    template: Arc<BaseTemplate>,
    feature_sets: Arc<FeatureSets>,
    matcher: LabelMatcher,
    conflict_retry_limit: u32,
    conflict_retry_delay: Duration,
    metrics: Option<Metrics>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        store: Arc<dyn MachineConfigStore>,
        template: Arc<BaseTemplate>,
        feature_sets: Arc<FeatureSets>,
        matcher: LabelMatcher,
    ) -> Self {
        Self {
            source,
            store,
            template,
            feature_sets,
            matcher,
            conflict_retry_limit: crate::config::DEFAULT_CONFLICT_RETRY_LIMIT,
            conflict_retry_delay: Duration::from_millis(crate::config::DEFAULT_CONFLICT_RETRY_DELAY_MS),
            metrics: None,
        }
    }

    /// Attempts per reconciliation and the base delay between them
    #[must_use]
    pub fn with_conflict_retries(mut self, limit: u32, delay: Duration) -> Self {
        self.conflict_retry_limit = limit.max(1);
        self.conflict_retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Reconciles one pool, retrying on store conflicts.
    pub async fn reconcile_pool(&self, pool_name: &str) -> Result<ReconcileReport, ControllerError> {
        let mut backoff = FibonacciBackoff::new(self.conflict_retry_delay, self.conflict_retry_delay * 10);

        for attempt in 1..=self.conflict_retry_limit {
            match self.attempt(pool_name).await {
                Err(ControllerError::Store(StoreError::Conflict(name))) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_conflict();
                    }
                    warn!(
                        "Conflict writing MachineConfig {} for pool {} (attempt {}/{}), retrying from a fresh read",
                        name, pool_name, attempt, self.conflict_retry_limit
                    );
                    if attempt < self.conflict_retry_limit {
                        let delay = backoff.next_backoff();
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                other => return other,
            }
        }

        error!(
            "Pool {}: giving up after {} conflicting writes",
            pool_name, self.conflict_retry_limit
        );
        Err(ControllerError::ConflictRetriesExhausted {
            pool: pool_name.to_string(),
            attempts: self.conflict_retry_limit,
        })
    }

    /// Overrides currently selecting a pool, in selector order
    pub async fn matched_overrides(&self, pool_name: &str) -> Result<Vec<Override>, ControllerError> {
        let Some(pool) = self.source.pool(pool_name).await? else {
            return Ok(Vec::new());
        };
        let overrides = self.source.overrides().await?;
        Ok(select(&pool, &overrides, self.matcher))
    }

    async fn attempt(&self, pool_name: &str) -> Result<ReconcileReport, ControllerError> {
        let Some(pool) = self.source.pool(pool_name).await? else {
            debug!("Pool {} no longer exists, skipping", pool_name);
            return Ok(ReconcileReport::skipped(pool_name));
        };
        let Some(policy) = self.source.feature_policy().await? else {
            warn!("FeatureGate {} not found, skipping pool {}", CLUSTER_FEATURE_GATE_NAME, pool_name);
            return Ok(ReconcileReport::skipped(pool_name));
        };
        let overrides = self.source.overrides().await?;

        let resolved = features::resolve(&policy, &self.feature_sets)?;
        let matched = select(&pool, &overrides, self.matcher);
        let config = render(&pool, &resolved.gates, &matched, &self.template)?;
        let artifact = build_artifact(&pool, &config)?;

        let outcome = self.sync(&artifact).await?;
        Ok(ReconcileReport {
            pool: pool.name,
            outcome,
            matched_overrides: matched,
        })
    }

    async fn sync(&self, artifact: &RenderedArtifact) -> Result<ReconcileOutcome, ControllerError> {
        let canonical = &artifact.keys.canonical;

        if let Some(existing) = self.store.get(canonical).await? {
            if artifact.matches(&existing) {
                debug!("MachineConfig {} is up to date", canonical);
                return Ok(ReconcileOutcome::Unchanged);
            }
            self.store.update(&artifact.apply_to(&existing))
                .await
                .map_err(|e| match e {
                    // deleted between read and write
                    StoreError::NotFound(name) => StoreError::Conflict(name),
                    other => other,
                })?;
            info!(
                "Updated MachineConfig {} for pool {} (generation {})",
                canonical, artifact.pool_name, artifact.pool_generation
            );
            return Ok(ReconcileOutcome::Updated);
        }

        if let Some(legacy) = &artifact.keys.legacy {
            if self.store.get(legacy).await?.is_some() {
                self.store.create(&artifact.to_machine_config()).await?;
                info!(
                    "Migrated pool {} from legacy MachineConfig {} to {}; legacy object left for garbage collection",
                    artifact.pool_name, legacy, canonical
                );
                return Ok(ReconcileOutcome::Migrated { legacy: legacy.clone() });
            }
        }

        self.store.create(&artifact.to_machine_config()).await?;
        info!(
            "Created MachineConfig {} for pool {} (generation {})",
            canonical, artifact.pool_name, artifact.pool_generation
        );
        Ok(ReconcileOutcome::Created)
    }
}
