//! Health and admin HTTP handlers.
//!
//! - Liveness check (`/health`)
//! - Readiness check with a database ping (`/ready`)
//! - Queue row counts per status (`/stats`)
//! - Prometheus metrics (`/metrics`)

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use database::postgres::check_health_detailed;
use domain_saved_search_notifications::metrics::QueueMetrics;
use domain_saved_search_notifications::{PgQueueRepository, QueueRepository};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::metrics;

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub repository: PgQueueRepository,
    pub metrics: QueueMetrics,
    pub app_name: String,
    pub app_version: String,
}

impl HealthState {
    pub fn new(
        repository: PgQueueRepository,
        metrics: QueueMetrics,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            metrics,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// Health response for liveness checks.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Liveness check handler.
///
/// Always returns OK if the server is running.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness check handler.
///
/// Ready once the queue database answers a ping.
pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let db = check_health_detailed(state.repository.db()).await;

    let status = if db.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db.healthy { "ready" } else { "not_ready" },
            "checks": {
                "database": {
                    "healthy": db.healthy,
                    "message": db.message,
                    "response_time_ms": db.response_time_ms,
                }
            }
        })),
    )
}

/// Queue row counts per status; also refreshes the queue gauges.
pub async fn stats_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.repository.stats().await {
        Ok(stats) => {
            state.metrics.record_stats(&stats);
            Ok(Json(json!({
                "pending": stats.pending,
                "processing": stats.processing,
                "sent": stats.sent,
                "failed": stats.failed,
                "total": stats.total(),
            })))
        }
        Err(e) => {
            warn!(error = %e, "Failed to read queue stats");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Failed to read queue stats: {}", e) })),
            ))
        }
    }
}

/// Prometheus metrics endpoint handler.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Some(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            output,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use domain_saved_search_notifications::{NewQueuedEmail, entity};
    use test_utils::TestDatabase;
    use tower::ServiceExt;

    async fn state() -> (TestDatabase, HealthState) {
        let db = TestDatabase::with_entity(entity::Entity).await;
        let repository = PgQueueRepository::new(db.connection());
        let state = HealthState::new(
            repository,
            QueueMetrics::new("Mock"),
            "voxel_digest_worker",
            "0.1.0",
        );
        (db, state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_app_info() {
        let (_db, state) = state().await;

        let response = router(state).oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["name"], "voxel_digest_worker");
    }

    #[tokio::test]
    async fn test_ready_pings_database() {
        let (_db, state) = state().await;

        let response = router(state).oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["database"]["healthy"], true);
    }

    #[tokio::test]
    async fn test_stats_counts_queue_rows() {
        let (_db, state) = state().await;
        state
            .repository
            .enqueue(NewQueuedEmail {
                recipient_email: "reader@example.com".to_string(),
                recipient_id: 5,
                post_id: 10,
                saved_search_id: 3,
                post_type: "places".to_string(),
                subject: "X".to_string(),
                message: "Y".to_string(),
            })
            .await
            .unwrap();

        let response = router(state).oneshot(get_request("/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["pending"], 1);
        assert_eq!(body["sent"], 0);
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (_db, state) = state().await;
        let response = router(state).oneshot(get_request("/admin")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
