use crate::protocol::{Job, TaskStatus};
use std::time::Duration;
use tokio::time::sleep;
use super::HandlerResult;

pub async fn handle_echo(job: &Job) -> HandlerResult {
    (TaskStatus::Success, Some(job.payload.clone()), None, None)
}

pub async fn handle_sleep(job: &Job) -> HandlerResult {
    let ms = job.payload.get("ms").and_then(|v| v.as_u64()).unwrap_or(100);
    sleep(Duration::from_millis(ms)).await;
    (TaskStatus::Success, None, None, None)
}

/// Fault-injection job for exercising the full pipeline: sleeps, then
/// succeeds, fails, or panics according to the payload.
pub async fn handle_simulate(job: &Job) -> HandlerResult {
    let ms = job.payload.get("ms").and_then(|v| v.as_u64()).unwrap_or(10);
    sleep(Duration::from_millis(ms)).await;
    match job.payload.get("outcome").and_then(|v| v.as_str()).unwrap_or("success") {
        "success" => (TaskStatus::Success, None, None, None),
        "error" => (
            TaskStatus::Error,
            None,
            Some("SIMULATED_FAILURE".to_string()),
            Some("simulated failure".to_string()),
        ),
        "panic" => panic!("simulated panic"),
        other => (
            TaskStatus::Error,
            None,
            Some("INVALID_OUTCOME".to_string()),
            Some(format!("unknown outcome: {}", other)),
        ),
    }
}
