use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::history::ResultHistory;
use crate::observability::metrics::Metrics;
use crate::protocol::{Job, TaskSpec};
use crate::registry::ServiceRegistry;
use crate::shed::LoadShed;

#[derive(Clone)]
pub struct ApiState {
    pub readiness: Arc<AtomicBool>,
    pub draining: Arc<AtomicBool>,
    pub version: String,
    pub metrics: Arc<Metrics>,
    pub registry: Arc<ServiceRegistry>,
    pub history: Arc<ResultHistory>,
    pub shed: LoadShed,
    pub submit_tx: mpsc::Sender<TaskSpec>,
    pub max_concurrency: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    pub job: Job,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct ServiceMessage {
    service_name: String,
    alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/_health", get(health_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/_build", get(build_handler))
        .route("/_state", get(state_handler))
        .route("/services", get(list_services_handler))
        .route("/services/:name/register", post(register_handler))
        .route("/services/:name/heartbeat", post(heartbeat_handler))
        .route("/services/:name", get(service_status_handler))
        .route("/tasks", post(submit_handler))
        .route("/tasks/:id/history", get(task_history_handler))
        .with_state(state)
}

pub async fn start_server(bind_addr: String, state: ApiState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);
    let listener = TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn ready_handler(State(state): State<ApiState>) -> (StatusCode, &'static str) {
    let draining = state.draining.load(Ordering::SeqCst);
    if draining {
        (StatusCode::SERVICE_UNAVAILABLE, "DRAINING")
    } else if state.readiness.load(Ordering::SeqCst) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

async fn build_handler(State(state): State<ApiState>) -> String {
    state.version.clone()
}

async fn metrics_handler(State(state): State<ApiState>) -> (StatusCode, String) {
    let data = state.metrics.encode();
    (StatusCode::OK, String::from_utf8_lossy(&data).to_string())
}

async fn state_handler(State(state): State<ApiState>) -> (StatusCode, String) {
    let draining = state.draining.load(Ordering::SeqCst);
    let ready = state.readiness.load(Ordering::SeqCst) && !draining;
    let running = state.metrics.tasks_in_progress.get() as f64;
    let max = state.max_concurrency as f64;
    let load = if max == 0.0 { 0.0 } else { (running / max).clamp(0.0, 1.0) };
    let body = json!({
        "ready": ready,
        "draining": draining,
        "load": load,
    }).to_string();
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, body)
}

async fn register_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<ServiceMessage>) {
    state.registry.register(&name);
    (StatusCode::OK, Json(ServiceMessage {
        service_name: name,
        alive: true,
        code: Some(200),
        description: None,
    }))
}

async fn heartbeat_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<ServiceMessage>) {
    match state.registry.heartbeat(&name) {
        Ok(()) => (StatusCode::OK, Json(ServiceMessage {
            service_name: name,
            alive: true,
            code: Some(200),
            description: None,
        })),
        Err(e) => (StatusCode::NOT_FOUND, Json(ServiceMessage {
            service_name: name,
            alive: false,
            code: Some(404),
            description: Some(e),
        })),
    }
}

async fn service_status_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<ServiceMessage>) {
    let alive = state.registry.is_alive(&name);
    let code = if alive { StatusCode::OK } else { StatusCode::NOT_FOUND };
    (code, Json(ServiceMessage {
        service_name: name,
        alive,
        code: Some(code.as_u16()),
        description: None,
    }))
}

async fn list_services_handler(State(state): State<ApiState>) -> Json<Value> {
    Json(json!(state.registry.snapshot()))
}

async fn submit_handler(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> (StatusCode, Json<Value>) {
    let _permit = match state.shed.try_acquire() {
        Some(p) => p,
        None => {
            state.metrics.submissions_shed_total.inc();
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
                "error": "under heavy load, please try again later"
            })));
        }
    };

    if req.name.trim().is_empty() || req.job.kind.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({
            "error": "name and job.kind are required"
        })));
    }

    let spec = TaskSpec::one_shot(req.name, req.job, req.timeout_ms);
    let task_id = spec.task_id.clone();
    let run_id = spec.run_id.clone();

    match state.submit_tx.try_send(spec) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({
            "task_id": task_id,
            "run_id": run_id,
        }))),
        Err(TrySendError::Full(_)) => {
            state.metrics.submissions_shed_total.inc();
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
                "error": "task queue is full"
            })))
        }
        Err(TrySendError::Closed(_)) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
            "error": "task queue is closed"
        }))),
    }
}

async fn task_history_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.history.runs(&id) {
        Some(runs) => (StatusCode::OK, Json(json!(runs))),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown task"}))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RunRecord;
    use crate::protocol::TaskState;
    use std::time::Duration;

    fn test_state(queue_capacity: usize, shed_capacity: usize) -> (ApiState, mpsc::Receiver<TaskSpec>) {
        let (submit_tx, submit_rx) = mpsc::channel(queue_capacity);
        let state = ApiState {
            readiness: Arc::new(AtomicBool::new(false)),
            draining: Arc::new(AtomicBool::new(false)),
            version: "0.1.0-test".to_string(),
            metrics: Arc::new(Metrics::new()),
            registry: Arc::new(ServiceRegistry::new(Duration::from_secs(5))),
            history: Arc::new(ResultHistory::new(100)),
            shed: LoadShed::new(shed_capacity),
            submit_tx,
            max_concurrency: 8,
        };
        (state, submit_rx)
    }

    async fn serve(state: ApiState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let (state, _rx) = test_state(4, 4);
        let readiness = state.readiness.clone();
        let draining = state.draining.clone();
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let res = client.get(format!("{}/_health", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.text().await.unwrap(), "OK");

        let res = client.get(format!("{}/readyz", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 503);
        assert_eq!(res.text().await.unwrap(), "NOT_READY");

        readiness.store(true, Ordering::SeqCst);
        let res = client.get(format!("{}/readyz", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.text().await.unwrap(), "READY");

        draining.store(true, Ordering::SeqCst);
        let res = client.get(format!("{}/readyz", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 503);
        assert_eq!(res.text().await.unwrap(), "DRAINING");

        let res = client.get(format!("{}/_build", base)).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "0.1.0-test");
    }

    #[tokio::test]
    async fn test_service_lifecycle() {
        let (state, _rx) = test_state(4, 4);
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let res = client.post(format!("{}/services/billing/register", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["service_name"], "billing");
        assert_eq!(body["alive"], true);

        let res = client.post(format!("{}/services/billing/heartbeat", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 200);

        let res = client.post(format!("{}/services/ghost/heartbeat", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 404);
        let body: Value = res.json().await.unwrap();
        assert!(body["description"].as_str().unwrap().contains("ghost"));

        let res = client.get(format!("{}/services/billing", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 200);

        let res = client.get(format!("{}/services/ghost", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 404);

        let res = client.get(format!("{}/services", base)).send().await.unwrap();
        let body: Value = res.json().await.unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["service_name"], "billing");
    }

    #[tokio::test]
    async fn test_submit_task() {
        let (state, mut rx) = test_state(4, 4);
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/tasks", base))
            .json(&json!({"name": "hello", "job": {"kind": "echo", "payload": {"x": 1}}}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 202);
        let body: Value = res.json().await.unwrap();
        assert!(body["task_id"].is_string());

        let spec = rx.recv().await.unwrap();
        assert_eq!(spec.name, "hello");
        assert_eq!(spec.job.kind, "echo");
        assert_eq!(spec.task_id, body["task_id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_submit_sheds_when_queue_full() {
        let (state, _rx) = test_state(1, 4);
        let metrics = state.metrics.clone();
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let body = json!({"name": "fill", "job": {"kind": "sleep", "payload": {"ms": 1}}});
        let res = client.post(format!("{}/tasks", base)).json(&body).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 202);

        // Nobody consumes the queue, so the second submission is shed.
        let res = client.post(format!("{}/tasks", base)).json(&body).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 503);
        assert_eq!(metrics.submissions_shed_total.get(), 1);
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let (state, _rx) = test_state(4, 4);
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/tasks", base))
            .json(&json!({"name": "", "job": {"kind": "echo", "payload": {}}}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_task_history_endpoint() {
        let (state, _rx) = test_state(4, 4);
        let history = state.history.clone();
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let res = client.get(format!("{}/tasks/nope/history", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 404);

        history.record("t-1", RunRecord {
            ts: "2024-01-01T00:00:00Z".to_string(),
            run_id: "r-1".to_string(),
            state: TaskState::Completed,
            error: None,
            latency_ms: Some(12),
        });
        let res = client.get(format!("{}/tasks/t-1/history", base)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["state"], "completed");
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let (state, _rx) = test_state(4, 4);
        state.metrics.tasks_received.inc();
        let base = serve(state).await;

        let res = reqwest::get(format!("{}/metrics", base)).await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let text = res.text().await.unwrap();
        assert!(text.contains("tasks_received"));
    }

    #[tokio::test]
    async fn test_state_endpoint() {
        let (state, _rx) = test_state(4, 4);
        state.readiness.store(true, Ordering::SeqCst);
        let base = serve(state).await;

        let res = reqwest::get(format!("{}/_state", base)).await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let body: Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();
        assert_eq!(body["ready"], true);
        assert_eq!(body["draining"], false);
        assert_eq!(body["load"], 0.0);
    }
}
