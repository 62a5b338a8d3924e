//! HTTP server for the A/B testing engine.
//!
//! Routes:
//!
//! | method | path                                   | body / query        |
//! |--------|----------------------------------------|---------------------|
//! | GET    | `/health`                              |                     |
//! | GET    | `/tests`                               |                     |
//! | POST   | `/tests`                               | `CreateTestRequest` |
//! | GET    | `/tests/{id}`                          |                     |
//! | POST   | `/tests/{id}/start`                    |                     |
//! | POST   | `/tests/{id}/events`                   | `RecordEventRequest`|
//! | GET    | `/tests/{id}/results`                  |                     |
//! | POST   | `/tests/{id}/stop`                     | `{reason?}`         |
//! | POST   | `/tests/{id}/pause`                    | `{reason?}`         |
//! | POST   | `/tests/{id}/resume`                   |                     |
//! | POST   | `/tests/{id}/cancel`                   | `{reason?}`         |
//! | GET    | `/tests/{id}/variants/{variant_id}`    |                     |
//! | GET    | `/tests/{id}/assignment`               | `?user_id=`         |

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use splitstat_core::{
    ABTestEngine, AssignmentResponse, CreateTestRequest, EventType, HealthResponse,
    ReasonRequest, RecordEventRequest, Test, TestListResponse, TestResults, TestStatus,
    TransitionResponse, Variant, MANUAL_STOP,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::ApiError;

const MANUAL_PAUSE: &str = "manual_pause";
const MANUAL_CANCEL: &str = "manual_cancel";

/// Shared state for the HTTP server.
struct AppState {
    engine: ABTestEngine,
}

type SharedState = State<Arc<AppState>>;

#[derive(Debug, Deserialize)]
struct AssignmentQuery {
    user_id: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

async fn list_tests(State(state): SharedState) -> Json<TestListResponse> {
    Json(TestListResponse {
        active: state.engine.active_tests(),
        completed: state.engine.completed_tests(),
    })
}

async fn create_test(
    State(state): SharedState,
    Json(request): Json<CreateTestRequest>,
) -> Result<(StatusCode, Json<Test>), ApiError> {
    let test = state.engine.create_test(request)?;
    Ok((StatusCode::CREATED, Json(test)))
}

async fn get_test(
    State(state): SharedState,
    Path(test_id): Path<String>,
) -> Result<Json<Test>, ApiError> {
    Ok(Json(state.engine.get_test(&test_id)?))
}

async fn start_test(
    State(state): SharedState,
    Path(test_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    state.engine.start_test(&test_id)?;
    Ok(Json(TransitionResponse::success(test_id, TestStatus::Running)))
}

/// Always answers 204. Malformed bodies and unknown event types are dropped so
/// that event producers never have to handle ingestion failures.
async fn record_event(
    State(state): SharedState,
    Path(test_id): Path<String>,
    body: Bytes,
) -> StatusCode {
    let request: RecordEventRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(test_id = %test_id, error = %err, "Dropping malformed event");
            return StatusCode::NO_CONTENT;
        }
    };

    match request.event_type.parse::<EventType>() {
        Ok(event_type) => state.engine.record_event(
            &test_id,
            &request.variant_id,
            event_type,
            request.event_data.as_ref(),
        ),
        Err(err) => debug!(test_id = %test_id, error = %err, "Dropping event"),
    }
    StatusCode::NO_CONTENT
}

async fn get_results(
    State(state): SharedState,
    Path(test_id): Path<String>,
) -> Result<Json<TestResults>, ApiError> {
    Ok(Json(state.engine.analyze_test_results(&test_id)?))
}

/// Stops the test and returns the final analysis.
async fn stop_test(
    State(state): SharedState,
    Path(test_id): Path<String>,
    body: Bytes,
) -> Result<Json<TestResults>, ApiError> {
    let reason = reason_from(&body)?.unwrap_or_else(|| MANUAL_STOP.to_string());
    state.engine.stop_test(&test_id, &reason)?;

    let results = match state.engine.get_test_results(&test_id) {
        Some(results) => results,
        None => state.engine.analyze_test_results(&test_id)?,
    };
    Ok(Json(results))
}

async fn pause_test(
    State(state): SharedState,
    Path(test_id): Path<String>,
    body: Bytes,
) -> Result<Json<TransitionResponse>, ApiError> {
    let reason = reason_from(&body)?.unwrap_or_else(|| MANUAL_PAUSE.to_string());
    state.engine.pause_test(&test_id, &reason)?;
    Ok(Json(TransitionResponse::success(test_id, TestStatus::Paused)))
}

async fn resume_test(
    State(state): SharedState,
    Path(test_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    state.engine.resume_test(&test_id)?;
    Ok(Json(TransitionResponse::success(test_id, TestStatus::Running)))
}

async fn cancel_test(
    State(state): SharedState,
    Path(test_id): Path<String>,
    body: Bytes,
) -> Result<Json<TransitionResponse>, ApiError> {
    let reason = reason_from(&body)?.unwrap_or_else(|| MANUAL_CANCEL.to_string());
    state.engine.cancel_test(&test_id, &reason)?;
    Ok(Json(TransitionResponse::success(test_id, TestStatus::Cancelled)))
}

async fn get_variant(
    State(state): SharedState,
    Path((test_id, variant_id)): Path<(String, String)>,
) -> Result<Json<Variant>, ApiError> {
    Ok(Json(state.engine.get_variant(&test_id, &variant_id)?))
}

async fn assign_variant(
    State(state): SharedState,
    Path(test_id): Path<String>,
    Query(query): Query<AssignmentQuery>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let variant_id = state.engine.assign_variant(&test_id, &query.user_id)?;
    Ok(Json(AssignmentResponse {
        test_id,
        user_id: query.user_id,
        variant_id,
    }))
}

/// Read an optional `{ "reason": ... }` body. An empty body means no reason.
fn reason_from(body: &Bytes) -> Result<Option<String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let request: ReasonRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(request.reason)
}

/// Build the router with all endpoints over `engine`.
pub fn build_router(engine: ABTestEngine) -> Router {
    let state = Arc::new(AppState { engine });
    Router::new()
        .route("/health", get(health))
        .route("/tests", get(list_tests).post(create_test))
        .route("/tests/{id}", get(get_test))
        .route("/tests/{id}/start", post(start_test))
        .route("/tests/{id}/events", post(record_event))
        .route("/tests/{id}/results", get(get_results))
        .route("/tests/{id}/stop", post(stop_test))
        .route("/tests/{id}/pause", post(pause_test))
        .route("/tests/{id}/resume", post(resume_test))
        .route("/tests/{id}/cancel", post(cancel_test))
        .route("/tests/{id}/variants/{variant_id}", get(get_variant))
        .route("/tests/{id}/assignment", get(assign_variant))
        .with_state(state)
}

/// Serve `engine` on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, engine: ABTestEngine, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(engine);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind `bind_address:port` and serve until Ctrl-C.
pub async fn run_server_async(
    engine: ABTestEngine,
    bind_address: &str,
    port: u16,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "splitstat server listening");

    serve(listener, engine, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutting down splitstat server");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use splitstat_core::ErrorResponse;
    use tower::ServiceExt;

    fn create_body(variants: usize) -> Value {
        let variants: Vec<Value> = (0..variants)
            .map(|i| json!({ "name": format!("V{}", i), "description": "", "data": {} }))
            .collect();
        json!({
            "name": "Signup button",
            "description": "Colour test",
            "test_type": "call_to_action",
            "primary_metric": "conversion_rate",
            "variants": variants,
            "baseline_rate": 0.3,
            "minimum_effect_size": 1.0,
            "start_date": "2026-01-01T00:00:00Z",
            "end_date": "2099-01-01T00:00:00Z"
        })
    }

    async fn send(
        engine: &ABTestEngine,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Bytes) {
        let app = build_router(engine.clone());
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    async fn create_running(engine: &ABTestEngine) -> String {
        let (status, body) = send(engine, "POST", "/tests", Some(create_body(2))).await;
        assert_eq!(status, StatusCode::CREATED);
        let test: Test = serde_json::from_slice(&body).unwrap();
        let (status, _) = send(engine, "POST", &format!("/tests/{}/start", test.test_id), None).await;
        assert_eq!(status, StatusCode::OK);
        test.test_id
    }

    async fn post_event(engine: &ABTestEngine, id: &str, variant: &str, event: &str, times: usize) {
        for _ in 0..times {
            let body = json!({ "variant_id": variant, "event_type": event });
            let (status, _) = send(engine, "POST", &format!("/tests/{}/events", id), Some(body)).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let engine = ABTestEngine::new();
        let (status, body) = send(&engine, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_create_returns_draft() {
        let engine = ABTestEngine::new();
        let (status, body) = send(&engine, "POST", "/tests", Some(create_body(2))).await;

        assert_eq!(status, StatusCode::CREATED);
        let test: Test = serde_json::from_slice(&body).unwrap();
        assert_eq!(test.status, TestStatus::Draft);
        assert_eq!(test.minimum_sample_size, 100);
        assert_eq!(test.variants.len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_single_variant() {
        let engine = ABTestEngine::new();
        let (status, body) = send(&engine, "POST", "/tests", Some(create_body(1))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("at least 2 variants"));
    }

    #[tokio::test]
    async fn test_start_unknown_is_not_found() {
        let engine = ABTestEngine::new();
        let (status, _) = send(&engine, "POST", "/tests/test_missing/start", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_twice_is_conflict() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;
        let (status, body) = send(&engine, "POST", &format!("/tests/{}/start", id), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("running"));
    }

    #[tokio::test]
    async fn test_events_are_recorded() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;

        post_event(&engine, &id, "variant_0", "impression", 3).await;
        post_event(&engine, &id, "variant_0", "click", 1).await;

        let test = engine.get_test(&id).unwrap();
        assert_eq!(test.variants[0].impressions, 3);
        assert_eq!(test.variants[0].clicks, 1);
    }

    #[tokio::test]
    async fn test_bad_events_still_no_content() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;

        post_event(&engine, &id, "variant_0", "purchase", 1).await;
        post_event(&engine, &id, "variant_9", "impression", 1).await;
        post_event(&engine, "test_missing", "variant_0", "impression", 1).await;

        let app = build_router(engine.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/tests/{}/events", id))
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let test = engine.get_test(&id).unwrap();
        assert_eq!(test.total_impressions(), 0);
    }

    #[tokio::test]
    async fn test_results_endpoint() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;
        post_event(&engine, &id, "variant_0", "impression", 10).await;
        post_event(&engine, &id, "variant_1", "impression", 10).await;
        post_event(&engine, &id, "variant_1", "conversion", 2).await;

        let (status, body) = send(&engine, "GET", &format!("/tests/{}/results", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let results: TestResults = serde_json::from_slice(&body).unwrap();
        assert_eq!(results.total_impressions, 20);
        assert_eq!(results.variants[1].conversion_rate, 0.2);
        assert_eq!(results.winner.as_deref(), Some("variant_1"));
        assert!(!results.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_stop_returns_final_results() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;
        post_event(&engine, &id, "variant_0", "impression", 5).await;

        let (status, body) = send(
            &engine,
            "POST",
            &format!("/tests/{}/stop", id),
            Some(json!({ "reason": "budget exhausted" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let results: TestResults = serde_json::from_slice(&body).unwrap();
        assert_eq!(results.status, TestStatus::Completed);

        let test = engine.get_test(&id).unwrap();
        assert_eq!(test.stop_reason.as_deref(), Some("budget exhausted"));

        let (status, _) = send(&engine, "POST", &format!("/tests/{}/stop", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_stop_without_body_uses_manual_reason() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;

        let (status, _) = send(&engine, "POST", &format!("/tests/{}/stop", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let test = engine.get_test(&id).unwrap();
        assert_eq!(test.stop_reason.as_deref(), Some(MANUAL_STOP));
    }

    #[tokio::test]
    async fn test_pause_resume_cancel() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;

        let (status, body) = send(&engine, "POST", &format!("/tests/{}/pause", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let response: TransitionResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.status, TestStatus::Paused);

        let (status, _) = send(&engine, "POST", &format!("/tests/{}/resume", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &engine,
            "POST",
            &format!("/tests/{}/cancel", id),
            Some(json!({ "reason": "wrong audience" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&engine, "GET", "/tests", None).await;
        assert_eq!(status, StatusCode::OK);
        let list: TestListResponse = serde_json::from_slice(&body).unwrap();
        assert!(list.active.is_empty());
        assert_eq!(list.completed[0].status, TestStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_variant_lookup() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;

        let (status, body) =
            send(&engine, "GET", &format!("/tests/{}/variants/variant_1", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let variant: Variant = serde_json::from_slice(&body).unwrap();
        assert_eq!(variant.name, "V1");

        let (status, _) =
            send(&engine, "GET", &format!("/tests/{}/variants/variant_5", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_assignment_endpoint() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;
        let uri = format!("/tests/{}/assignment?user_id=user_42", id);

        let (status, body) = send(&engine, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let first: AssignmentResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(first.user_id, "user_42");
        assert!(first.variant_id.starts_with("variant_"));

        let (_, body) = send(&engine, "GET", &uri, None).await;
        let second: AssignmentResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(first.variant_id, second.variant_id);
    }

    #[tokio::test]
    async fn test_get_test_endpoint() {
        let engine = ABTestEngine::new();
        let id = create_running(&engine).await;

        let (status, body) = send(&engine, "GET", &format!("/tests/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let test: Test = serde_json::from_slice(&body).unwrap();
        assert_eq!(test.status, TestStatus::Running);

        let (status, _) = send(&engine, "GET", "/tests/test_nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_server_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = run_server_async(ABTestEngine::new(), "127.0.0.1", port).await;
        assert!(result.is_err());
    }
}
