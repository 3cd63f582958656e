//! HTTP surface: a health probe and manual job submission.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use listwatch_analysis::{AnalysisError, TemplateError};
use listwatch_core::UsageWindow;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::context::WorkerContext;
use crate::dispatcher::{submit_job, JobRequest, JobResult};
use crate::middleware::{request_id, RequestId};
use crate::WorkerError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    uptime_secs: f64,
    llm_configured: bool,
    notifier_configured: bool,
    usage: UsageWindow,
}

impl ResponseMeta {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    fn from_worker(request_id: String, error: &WorkerError) -> Self {
        Self::new(request_id, error_code(error), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn error_code(error: &WorkerError) -> &'static str {
    match error {
        WorkerError::ListNotFound(_)
        | WorkerError::Template(TemplateError::NotFound(_))
        | WorkerError::Analysis(
            AnalysisError::ListNotFound(_) | AnalysisError::TemplateNotFound(_),
        ) => "not_found",
        WorkerError::InvalidJobData(_) | WorkerError::TemplateNotConfigured(_) => "bad_request",
        WorkerError::Analysis(AnalysisError::NoTweetsAvailable | AnalysisError::LlmNotConfigured) => {
            "conflict"
        }
        _ => "internal_error",
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

pub fn build_app(ctx: Arc<WorkerContext>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/jobs", post(submit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(ctx)
}

async fn health(
    State(ctx): State<Arc<WorkerContext>>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    Json(ApiResponse {
        data: HealthData {
            status: "ok",
            uptime_secs: ctx.uptime_secs(),
            llm_configured: ctx.engine.llm_configured(),
            notifier_configured: ctx.notifier.is_configured(),
            usage: ctx.usage.current_window(),
        },
        meta: ResponseMeta::new(req_id.0),
    })
}

/// Runs a job to completion. The body is the bare `{success, result,
/// processingTime}` job result; failures use the standard error envelope.
async fn submit(
    State(ctx): State<Arc<WorkerContext>>,
    Extension(req_id): Extension<RequestId>,
    Json(mut job): Json<JobRequest>,
) -> Result<Json<JobResult>, ApiError> {
    if job.request_id.is_none() {
        job.request_id = Some(req_id.0.clone());
    }
    submit_job(&ctx, job)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_worker(req_id.0, &e))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use listwatch_analysis::AnalysisEngine;
    use listwatch_core::UsageCounter;
    use listwatch_db::{MemoryStore, Store};
    use listwatch_source::{FetchOutcome, FetchWindow, SourceError, TweetSource};
    use tower::ServiceExt;

    use super::*;
    use crate::notify::DiscordNotifier;

    struct EmptySource;

    #[async_trait]
    impl TweetSource for EmptySource {
        async fn fetch_window(
            &self,
            _source_list_id: &str,
            _window: FetchWindow,
        ) -> Result<FetchOutcome, SourceError> {
            Ok(FetchOutcome::default())
        }
    }

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let usage = Arc::new(UsageCounter::new());
        let engine = AnalysisEngine::new(
            Arc::clone(&store) as Arc<dyn Store>,
            None,
            PathBuf::from("exports"),
            Arc::clone(&usage),
        )
        .unwrap();
        let ctx = WorkerContext::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(EmptySource),
            Arc::new(engine),
            DiscordNotifier::new(None, 5).unwrap(),
            usage,
        );
        (build_app(Arc::new(ctx)), store)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_job(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/jobs")
            .header("content-type", "application/json")
            .header("x-request-id", "req-test")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_status_and_echoes_request_id() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["llm_configured"], false);
        assert_eq!(json["meta"]["request_id"], "abc-123");
    }

    #[tokio::test]
    async fn test_job_succeeds_and_is_recorded() {
        let (app, store) = app();
        let response = app
            .oneshot(post_job(&serde_json::json!({ "type": "test", "data": { "ping": 1 } })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["data"]["ping"], 1);
        assert!(json["processingTime"].is_u64());

        let executions = store.executions();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].request_id, "req-test");
    }

    #[tokio::test]
    async fn missing_list_maps_to_not_found() {
        let (app, store) = app();
        let response = app
            .oneshot(post_job(&serde_json::json!({
                "type": "manual_analysis",
                "data": { "listId": "nope" }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(store.executions().len(), 1);
    }

    #[tokio::test]
    async fn malformed_job_data_maps_to_bad_request() {
        let (app, _) = app();
        let response = app
            .oneshot(post_job(&serde_json::json!({ "type": "collect_list", "data": {} })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_conflict_maps_to_409() {
        let response = ApiError::new("req-1", "conflict", "no tweets").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
