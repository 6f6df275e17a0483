//! HTTP REST layer over the scenario engine.
//!
//! Routes:
//!   POST /api/v1/executions              start an execution
//!   GET  /api/v1/executions              ids of in-flight executions
//!   GET  /api/v1/executions/{id}         progress/status snapshot
//!   POST /api/v1/executions/{id}/stop    request a graceful stop

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::ScenarioEngine;

use handlers::AppState;

pub fn router(engine: Arc<ScenarioEngine>) -> Router {
    let state = AppState { engine };
    Router::new()
        .route(
            "/api/v1/executions",
            post(handlers::executions::start).get(handlers::executions::list),
        )
        .route("/api/v1/executions/:id", get(handlers::executions::status))
        .route(
            "/api/v1/executions/:id/stop",
            post(handlers::executions::stop),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(engine: Arc<ScenarioEngine>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, router(engine)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use device::mock::{MockDriver, MockProvider};
    use events::EventBus;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use store::{MemoryMediaStore, MemoryReportWriter, MemoryStore, ScenarioRecord};
    use tower::ServiceExt;

    use engine::{
        EngineConfig, ExecutionRegistry, MediaCoordinator, ScenarioEngine,
    };

    fn test_engine() -> Arc<ScenarioEngine> {
        let store = Arc::new(MemoryStore::new());
        store.insert_scenario(ScenarioRecord {
            id: "s1".into(),
            name: "Scenario s1".into(),
            package_id: None,
            category_id: None,
            definition: json!({
                "nodes": [
                    { "id": "n-start", "kind": "start" },
                    { "id": "n-end", "kind": "end" }
                ],
                "edges": [{ "from": "n-start", "to": "n-end" }]
            }),
        });
        Arc::new(ScenarioEngine::new(
            Arc::new(ExecutionRegistry::new()),
            store,
            Arc::new(MemoryReportWriter::new()),
            Arc::new(MockProvider::new(vec![Arc::new(MockDriver::new("d1"))])),
            MediaCoordinator::new(Arc::new(MemoryMediaStore::new())),
            EventBus::new(),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn start_returns_accepted_with_an_id() {
        let app = router(test_engine());

        let response = app
            .oneshot(
                Request::post("/api/v1/executions")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "scenarioIds": ["s1"], "deviceIds": ["d1"] }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("executionId").is_some());
    }

    #[tokio::test]
    async fn start_without_devices_is_a_bad_request() {
        let app = router(test_engine());

        let response = app
            .oneshot(
                Request::post("/api/v1/executions")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "scenarioIds": ["s1"], "deviceIds": [] }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_of_unknown_execution_is_not_found() {
        let app = router(test_engine());

        let response = app
            .oneshot(
                Request::get(format!(
                    "/api/v1/executions/{}",
                    uuid::Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_of_unknown_execution_is_not_found() {
        let app = router(test_engine());

        let response = app
            .oneshot(
                Request::post(format!(
                    "/api/v1/executions/{}/stop",
                    uuid::Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
