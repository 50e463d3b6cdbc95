//! Control plane HTTP API using Axum.
//!
//! Provides endpoints for:
//! - Subscriber status (/check_subscriber?imsi=...)
//! - Graceful shutdown trigger (/stop)
//! - Health check (/healthz)
//! - Runtime stats (/stats)
//! - Metrics (/metrics)

mod handlers;
mod server;

pub use handlers::{HealthResponse, StatsResponse, SubscriberQuery};
pub use server::{router, serve, ControlState};

use crate::bootstrap::LifecycleState;

/// Operations the control plane needs from the gateway.
pub trait ControlHandle: Send + Sync + 'static {
    /// Whether `imsi` has a live session
    fn subscriber_active(&self, imsi: &str) -> bool;

    fn session_count(&self) -> usize;

    fn state(&self) -> LifecycleState;

    /// Start the graceful drain; repeated calls are ignored
    fn request_shutdown(&self);
}
