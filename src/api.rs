use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dispatch::{
        Dispatcher,
        models::{ExecutionRequest, ExecutionResult},
    },
    error::ApiError,
    metrics::MetricsRegistry,
};

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsRegistry>,
}

pub fn routes(
    dispatcher: Arc<Dispatcher>,
    metrics_registry: Arc<MetricsRegistry>,
    max_body_bytes: usize,
) -> Router {
    let state = AppState {
        dispatcher,
        metrics: metrics_registry,
    };
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/api/execute", post(execute))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render_prometheus())
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.dispatcher.execute(request).await))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::routes;
    use crate::{
        dispatch::{
            Dispatcher, Runners,
            inline::{BoaSandbox, InlineLimits, LocalInlineRunner},
            language::InterpreterSpec,
            remote::RemoteExecutionProxy,
            subprocess::SubprocessRunner,
            testing::StubRemote,
        },
        metrics::MetricsRegistry,
    };

    fn app(workspace: &TempDir, stub: &StubRemote, max_body_bytes: usize) -> Router {
        let metrics = Arc::new(MetricsRegistry::new());
        let runners = Runners {
            inline: Arc::new(LocalInlineRunner::new(Arc::new(BoaSandbox::new(InlineLimits {
                loop_iterations: 100_000,
                recursion_depth: 256,
            })))),
            subprocess: Arc::new(SubprocessRunner::new(
                InterpreterSpec {
                    program: "sh".to_string(),
                    args: Vec::new(),
                    extension: "sh",
                },
                workspace.path().to_path_buf(),
                4096,
            )),
            remote: Arc::new(
                RemoteExecutionProxy::new(stub.url.clone(), Duration::from_secs(5)).unwrap(),
            ),
        };
        let dispatcher = Arc::new(Dispatcher::new(runners, Duration::from_secs(5), metrics.clone()));
        routes(dispatcher, metrics, max_body_bytes)
    }

    async fn post_json(app: Router, body: String) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post("/api/execute")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn execute_returns_canonical_shape() {
        let workspace = TempDir::new().unwrap();
        let stub = StubRemote::json(json!({})).await;
        let app = app(&workspace, &stub, 1024 * 1024);

        let body = json!({
            "code": "echo \"$(cat)\"",
            "language": "python",
            "fileName": "main.py",
            "stdin": "line one\nline two"
        });
        let (status, value) = post_json(app, body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "success": true, "output": "line one\nline two\n" }));
    }

    #[tokio::test]
    async fn failed_dispatch_is_still_http_ok() {
        let workspace = TempDir::new().unwrap();
        let stub = StubRemote::json(json!({ "message": "no runtime" })).await;
        let app = app(&workspace, &stub, 1024 * 1024);

        let (status, value) =
            post_json(app, json!({ "code": "x", "language": "zig" }).to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Execution failed");
        assert_eq!(value["output"], "no runtime");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_dispatch() {
        let workspace = TempDir::new().unwrap();
        let stub = StubRemote::json(json!({})).await;
        let app = app(&workspace, &stub, 1024 * 1024);

        let (status, value) = post_json(app, json!({ "language": "go" }).to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["success"], false);
        assert_eq!(stub.hits(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let workspace = TempDir::new().unwrap();
        let stub = StubRemote::json(json!({})).await;
        let app = app(&workspace, &stub, 64);

        let code = "x".repeat(256);
        let (status, value) =
            post_json(app, json!({ "code": code, "language": "go" }).to_string()).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn health_and_metrics_respond() {
        let workspace = TempDir::new().unwrap();
        let stub = StubRemote::json(json!({})).await;
        let app = app(&workspace, &stub, 1024);

        let response = app
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("dispatch_total 0"));
    }
}
