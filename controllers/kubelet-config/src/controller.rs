//! Main controller implementation.
//!
//! Builds the shared render inputs once, starts the reconciliation workers,
//! the resource watchers and the probe server, and tears them down in order
//! on shutdown.

use crate::backoff::RequeueBackoffs;
use crate::config::ControllerConfig;
use crate::dispatcher::{DispatchHandle, Dispatcher};
use crate::error::ControllerError;
use crate::metrics::{self, Metrics, ProbeState};
use crate::reconciler::Reconciler;
use crate::snapshot::{KubeSnapshotSource, SnapshotSource};
use crate::status::StatusReporter;
use crate::watcher::Watcher;
use crds::KubeletConfig;
use kube::{Api, Client};
use kubelet_render::{selector_matches, BaseTemplate, FeatureSets};
use machineconfig_client::KubeMachineConfigStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

type Task = JoinHandle<Result<(), ControllerError>>;

/// Runs one reconciliation per dispatched pool
struct PoolHandler {
    reconciler: Reconciler,
    status: StatusReporter,
    backoffs: RequeueBackoffs,
    metrics: Metrics,
    queue: DispatchHandle,
}

impl PoolHandler {
    async fn handle(&self, pool: String) {
        let result = self.reconciler.reconcile_pool(&pool).await;

        match &result {
            Ok(report) => {
                self.metrics.record_outcome(report.outcome.as_str());
                self.backoffs.reset(&pool);
                debug!("Pool {} reconciled: {} (overrides {:?})", pool, report.outcome, report.override_names());
                self.status.report(&pool, &report.matched_overrides, &result).await;
            }
            Err(e) => {
                self.metrics.record_outcome(e.outcome_label());
                error!("Failed to reconcile pool {}: {}", pool, e);

                let overrides = match self.reconciler.matched_overrides(&pool).await {
                    Ok(overrides) => overrides,
                    Err(lookup) => {
                        warn!("Cannot report status for pool {}: {}", pool, lookup);
                        Vec::new()
                    }
                };
                self.status.report(&pool, &overrides, &result).await;

                if e.should_requeue() {
                    let delay = self.backoffs.next_delay(&pool);
                    info!("Requeueing pool {} in {:?}", pool, delay);
                    let queue = self.queue.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        queue.enqueue(pool);
                    });
                }
            }
        }
    }
}

/// Main controller for kubelet configuration rendering.
pub struct Controller {
    dispatcher: Dispatcher,
    ready: Arc<AtomicBool>,
    pool_watcher: Task,
    override_watcher: Task,
    feature_gate_watcher: Task,
    machine_config_watcher: Task,
    metrics_server: Task,
    stop_metrics: oneshot::Sender<()>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Kubelet Config Controller");

        let kube_client = Client::try_default().await?;

        // Fatal at startup; never rebuilt afterwards
        let template = Arc::new(BaseTemplate::load(&config.template_context())?);
        let feature_sets = Arc::new(FeatureSets::builtin());
        info!(
            "Loaded base template ({} baseline feature gates)",
            template.feature_gates()?.len()
        );

        let source: Arc<dyn SnapshotSource> = Arc::new(KubeSnapshotSource::new(kube_client.clone()));
        let store = Arc::new(KubeMachineConfigStore::new(kube_client.clone()));
        let metrics = Metrics::new()?;

        let reconciler = Reconciler::new(source.clone(), store, template, feature_sets, selector_matches)
            .with_conflict_retries(config.conflict_retry_limit, config.conflict_retry_delay)
            .with_metrics(metrics.clone());
        let status = StatusReporter::new(Api::<KubeletConfig>::all(kube_client.clone()));

        let dispatcher = {
            let metrics = metrics.clone();
            Dispatcher::start(config.worker_count, move |queue| {
                let handler = Arc::new(PoolHandler {
                    reconciler,
                    status,
                    backoffs: RequeueBackoffs::default(),
                    metrics,
                    queue,
                });
                move |pool: String| {
                    let handler = handler.clone();
                    async move { handler.handle(pool).await }
                }
            })
        };

        let watcher = Arc::new(Watcher::new(dispatcher.handle(), source, kube_client));

        let pool_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_pools().await })
        };
        let override_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_overrides().await })
        };
        let feature_gate_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_feature_gates().await })
        };
        let machine_config_watcher = tokio::spawn(async move { watcher.watch_machine_configs().await });

        let ready = Arc::new(AtomicBool::new(false));
        let (stop_metrics, stopped) = oneshot::channel::<()>();
        let probe_state = ProbeState {
            metrics,
            ready: ready.clone(),
        };
        let metrics_server = tokio::spawn(metrics::serve(config.metrics_addr, probe_state, async move {
            let _ = stopped.await;
        }));

        ready.store(true, Ordering::Release);

        Ok(Self {
            dispatcher,
            ready,
            pool_watcher,
            override_watcher,
            feature_gate_watcher,
            machine_config_watcher,
            metrics_server,
            stop_metrics,
        })
    }

    /// Runs the controller until a shutdown signal or a task failure.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Kubelet Config Controller running");

        let result = tokio::select! {
            _ = shutdown_signal() => Ok(()),
            result = &mut self.pool_watcher => task_exit("MachineConfigPool watcher", result),
            result = &mut self.override_watcher => task_exit("KubeletConfig watcher", result),
            result = &mut self.feature_gate_watcher => task_exit("FeatureGate watcher", result),
            result = &mut self.machine_config_watcher => task_exit("MachineConfig watcher", result),
            result = &mut self.metrics_server => task_exit("Metrics server", result),
        };

        self.ready.store(false, Ordering::Release);
        self.pool_watcher.abort();
        self.override_watcher.abort();
        self.feature_gate_watcher.abort();
        self.machine_config_watcher.abort();

        self.dispatcher.shutdown().await;
        let _ = self.stop_metrics.send(());

        info!("Kubelet Config Controller stopped");
        result
    }
}

fn task_exit(task: &str, result: Result<Result<(), ControllerError>, JoinError>) -> Result<(), ControllerError> {
    match result {
        Ok(Ok(())) => Err(ControllerError::Watch(format!("{} exited unexpectedly", task))),
        Ok(Err(e)) => Err(ControllerError::Watch(format!("{} error: {}", task, e))),
        Err(e) => Err(ControllerError::Watch(format!("{} panicked: {}", task, e))),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
