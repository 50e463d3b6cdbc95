//! Control plane HTTP server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::telemetry::Metrics;

use super::handlers::{
    check_subscriber_handler, health_handler, metrics_handler, stats_handler, stop_handler,
};
use super::ControlHandle;

/// Control plane state shared by all handlers.
pub struct ControlState {
    handle: Arc<dyn ControlHandle>,
    metrics: Option<Arc<Metrics>>,
    start_time: Instant,
}

impl ControlState {
    pub fn new(handle: Arc<dyn ControlHandle>, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            handle,
            metrics,
            start_time: Instant::now(),
        }
    }

    pub fn handle(&self) -> &dyn ControlHandle {
        self.handle.as_ref()
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_deref()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Build the control plane router.
pub fn router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route(
            "/check_subscriber",
            get(check_subscriber_handler).post(check_subscriber_handler),
        )
        .route("/stop", get(stop_handler).post(stop_handler))
        .route("/healthz", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the control plane on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ControlState>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "starting control plane");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("control plane shutting down");
        })
        .await
}

