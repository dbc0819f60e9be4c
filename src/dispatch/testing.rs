use std::sync::{Arc, Mutex};

use axum::{Router, extract::State, http::StatusCode, routing::post};
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Clone)]
struct StubState {
    status: StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// In-process stand-in for the remote execution service.
pub struct StubRemote {
    pub url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl StubRemote {
    pub async fn json(body: Value) -> Self {
        Self::with_status(StatusCode::OK, body.to_string()).await
    }

    pub async fn with_status(status: StatusCode, body: String) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            status,
            body,
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/execute", post(record))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{addr}/execute"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn record(State(state): State<StubState>, body: String) -> (StatusCode, String) {
    let parsed = serde_json::from_str(&body).unwrap_or(Value::Null);
    state.requests.lock().unwrap().push(parsed);
    (state.status, state.body.clone())
}
