//! Health and metrics endpoints for the Room Controller.
//!
//! - `GET /health`: liveness (the process is running)
//! - `GET /ready`: readiness (startup finished, at least one media node
//!   registered, not shutting down)
//! - `GET /metrics`: Prometheus text rendering, when a recorder handle is given

use axum::{extract::State, http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Liveness and readiness flags shared with the HTTP handlers.
#[derive(Debug)]
pub struct HealthState {
    live: AtomicBool,
    accepting: AtomicBool,
    media_nodes: AtomicUsize,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Live, not accepting, no media nodes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            accepting: AtomicBool::new(false),
            media_nodes: AtomicUsize::new(0),
        }
    }

    /// Startup finished; rooms may be placed.
    pub fn set_ready(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Shutting down; stop receiving traffic.
    pub fn set_not_ready(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn set_media_nodes(&self, count: usize) {
        self.media_nodes.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && self.media_nodes.load(Ordering::SeqCst) > 0
    }
}

/// Router serving `/health` and `/ready`, plus `/metrics` when `metrics` is set.
pub fn health_router(health_state: Arc<HealthState>, metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state);

    match metrics {
        Some(handle) => router.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(handle),
        ),
        None => router,
    }
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    #[test]
    fn test_not_ready_until_accepting_with_nodes() {
        let state = HealthState::new();
        assert!(state.is_live());
        assert!(!state.is_ready());

        state.set_ready();
        assert!(!state.is_ready(), "No media nodes registered yet");

        state.set_media_nodes(2);
        assert!(state.is_ready());

        state.set_not_ready();
        assert!(!state.is_ready());
    }

    async fn status_of(app: Router, uri: &str) -> StatusCode {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        app.oneshot(request)
            .await
            .expect("Failed to execute request")
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoint_returns_ok() {
        let app = health_router(Arc::new(HealthState::new()), None);
        assert_eq!(status_of(app, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_endpoint_tracks_state() {
        let state = Arc::new(HealthState::new());
        let app = health_router(Arc::clone(&state), None);
        assert_eq!(
            status_of(app.clone(), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.set_media_nodes(1);
        state.set_ready();
        assert_eq!(status_of(app, "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_route_renders_recorder() {
        use http_body_util::BodyExt;
        use metrics_exporter_prometheus::PrometheusBuilder;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            ::metrics::counter!("rc_room_placements_total", "strategy" => "geo").increment(1);
        });

        let app = health_router(Arc::new(HealthState::new()), Some(handle));
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("rc_room_placements_total"));
    }

    #[tokio::test]
    async fn test_metrics_route_absent_without_handle() {
        let app = health_router(Arc::new(HealthState::new()), None);
        assert_eq!(status_of(app, "/metrics").await, StatusCode::NOT_FOUND);
    }
}
