//! Control plane handlers.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::bootstrap::LifecycleState;

use super::ControlState;

/// Query string of `/check_subscriber`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriberQuery {
    pub imsi: Option<String>,
}

/// Subscriber status handler.
pub async fn check_subscriber_handler(
    State(state): State<Arc<ControlState>>,
    Query(query): Query<SubscriberQuery>,
) -> impl IntoResponse {
    match query.imsi.as_deref().filter(|imsi| !imsi.is_empty()) {
        Some(imsi) if state.handle().subscriber_active(imsi) => (StatusCode::OK, "active"),
        Some(_) => (StatusCode::OK, "not active"),
        None => (StatusCode::BAD_REQUEST, "Bad request: missing IMSI"),
    }
}

/// Graceful shutdown trigger.
pub async fn stop_handler(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    info!("graceful shutdown requested via control plane");
    state.handle().request_shutdown();
    (StatusCode::OK, "Stopping")
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: String,
    pub version: String,
}

/// Health check handler. Anything but `running` is unavailable.
pub async fn health_handler(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    let lifecycle = state.handle().state();
    let healthy = lifecycle == LifecycleState::Running;

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unavailable" }.to_string(),
        state: lifecycle.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Stats response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub state: String,
}

/// Stats handler.
pub async fn stats_handler(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    Json(StatsResponse {
        uptime_seconds: state.uptime().as_secs(),
        active_sessions: state.handle().session_count(),
        state: state.handle().state().to_string(),
    })
}

/// Metrics handler (Prometheus format).
pub async fn metrics_handler(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    let body = state.metrics().map(|m| m.render()).unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlHandle;
    use axum::body::to_bytes;
    use axum::response::Response;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeGateway {
        active: HashSet<String>,
        state: Mutex<LifecycleState>,
        shutdown_requests: AtomicUsize,
    }

    impl FakeGateway {
        fn new(active: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                active: active.iter().map(|s| s.to_string()).collect(),
                state: Mutex::new(LifecycleState::Running),
                shutdown_requests: AtomicUsize::new(0),
            })
        }
    }

    impl ControlHandle for FakeGateway {
        fn subscriber_active(&self, imsi: &str) -> bool {
            self.active.contains(imsi)
        }

        fn session_count(&self) -> usize {
            self.active.len()
        }

        fn state(&self) -> LifecycleState {
            *self.state.lock().unwrap()
        }

        fn request_shutdown(&self) {
            self.shutdown_requests.fetch_add(1, Ordering::SeqCst);
            *self.state.lock().unwrap() = LifecycleState::Draining;
        }
    }

    fn control_state(fake: &Arc<FakeGateway>) -> Arc<ControlState> {
        Arc::new(ControlState::new(fake.clone(), None))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn query(imsi: Option<&str>) -> Query<SubscriberQuery> {
        Query(SubscriberQuery {
            imsi: imsi.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_check_subscriber() {
        let fake = FakeGateway::new(&["250991234567890"]);
        let state = control_state(&fake);

        let response = check_subscriber_handler(State(state.clone()), query(Some("250991234567890")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "active");

        let response = check_subscriber_handler(State(state), query(Some("250991234567891")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "not active");
    }

    #[tokio::test]
    async fn test_check_subscriber_missing_imsi() {
        let fake = FakeGateway::new(&[]);
        let state = control_state(&fake);

        for imsi in [None, Some("")] {
            let response = check_subscriber_handler(State(state.clone()), query(imsi))
                .await
                .into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_text(response).await, "Bad request: missing IMSI");
        }
    }

    #[tokio::test]
    async fn test_stop_and_health() {
        let fake = FakeGateway::new(&[]);
        let state = control_state(&fake);

        let response = health_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = stop_handler(State(state.clone())).await.into_response();
        assert_eq!(body_text(response).await, "Stopping");
        assert_eq!(fake.shutdown_requests.load(Ordering::SeqCst), 1);

        let response = health_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let health: HealthResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health.state, "draining");
    }

    #[tokio::test]
    async fn test_stats() {
        let fake = FakeGateway::new(&["250991234567890", "250991234567891"]);
        let response = stats_handler(State(control_state(&fake))).await.into_response();

        let stats: StatsResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.state, "running");
    }
}
