use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Job {
    pub kind: String,
    pub payload: Value,
}

/// A unit of schedulable work. `task_id` is stable across firings of a
/// periodic task; `run_id` is fresh per firing and is the dedup key.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskSpec {
    pub task_id: String,
    pub run_id: String,
    pub name: String,
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub submitted_at: String,
}

impl TaskSpec {
    pub fn one_shot(name: String, job: Job, timeout_ms: Option<u64>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            task_id: id.clone(),
            run_id: id,
            name,
            job,
            period_secs: None,
            timeout_ms,
            submitted_at: Utc::now().to_rfc3339(),
        }
    }

    /// A periodic template. The scheduler never enqueues the template itself,
    /// only copies produced by `fresh_run`.
    pub fn periodic(name: String, job: Job, period_secs: u64) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            run_id: String::new(),
            name,
            job,
            period_secs: Some(period_secs),
            timeout_ms: None,
            submitted_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn fresh_run(&self) -> Self {
        let mut spec = self.clone();
        spec.run_id = Uuid::new_v4().to_string();
        spec.submitted_at = Utc::now().to_rfc3339();
        spec
    }
}

/// Outcome of a single run, produced by the executor.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum TaskStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "panicked")]
    Panicked,
}

/// Lifecycle states published on the bus and recorded in history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum TaskState {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "panicked")]
    Panicked,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "cancelled")]
    Cancelled,
}

pub fn map_status_to_task_state(s: &TaskStatus) -> TaskState {
    match s {
        TaskStatus::Success => TaskState::Completed,
        TaskStatus::Error => TaskState::Failed,
        TaskStatus::Timeout => TaskState::Timeout,
        TaskStatus::Panicked => TaskState::Panicked,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub run_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub node_id: String,
    pub job_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub finished_at: String,
}

/// Payload delivered to event bus subscribers.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    TaskStateChanged {
        task_id: String,
        run_id: String,
        name: String,
        state: TaskState,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Heartbeat {
        node_id: String,
        timestamp: String,
        status: String, // "idle", "busy", "draining", "stopped"
        load: f64,      // 0.0 to 1.0
    },
    ServiceObserved {
        service: String,
        alive: bool,
    },
}
