//! Prometheus metrics and the probe endpoints.
//!
//! Serves `/metrics`, `/healthz` and `/readyz` on `METRICS_ADDR`.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Controller metrics, backed by a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    conflicts: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("kubelet_config_reconciliations_total", "Pool reconciliations by outcome"),
            &["outcome"],
        )?;
        let conflicts = IntCounter::new(
            "kubelet_config_store_conflicts_total",
            "MachineConfig writes rejected because of a concurrent writer",
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(conflicts.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            conflicts,
        })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.reconciliations.with_label_values(&[outcome]).inc();
    }

    pub fn record_conflict(&self) {
        self.conflicts.inc();
    }

    /// Metrics in Prometheus text format
    pub fn export(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ControllerError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}

/// Probe server state
#[derive(Clone)]
pub struct ProbeState {
    pub metrics: Metrics,
    /// Set once the controller has started its watchers
    pub ready: Arc<AtomicBool>,
}

async fn metrics_handler(State(state): State<ProbeState>) -> Response {
    match state.metrics.export() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ProbeState>) -> Response {
    if state.ready.load(Ordering::Acquire) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response()
    }
}

pub fn router(state: ProbeState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the probe endpoints until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    state: ProbeState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics and probes on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> ProbeState {
        ProbeState {
            metrics: Metrics::new().unwrap(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn get_status(state: ProbeState, path: &str) -> StatusCode {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        router(state).oneshot(request).await.unwrap().status()
    }

    #[test]
    fn test_export_contains_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outcome("created");
        metrics.record_conflict();

        let output = metrics.export().unwrap();
        assert!(output.contains(r#"kubelet_config_reconciliations_total{outcome="created"} 1"#));
        assert!(output.contains("kubelet_config_store_conflicts_total 1"));
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let state = state();
        assert_eq!(get_status(state.clone(), "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);

        state.ready.store(true, Ordering::Release);
        assert_eq!(get_status(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_and_metrics_routes() {
        let state = state();
        assert_eq!(get_status(state.clone(), "/healthz").await, StatusCode::OK);
        assert_eq!(get_status(state, "/metrics").await, StatusCode::OK);
    }
}
