use crate::protocol::TaskState;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub ts: String,
    pub run_id: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Per-task run log, bounded per task; the oldest runs are trimmed first.
pub struct ResultHistory {
    max_runs: usize,
    inner: RwLock<HashMap<String, Vec<RunRecord>>>,
}

impl ResultHistory {
    pub fn new(max_runs: usize) -> Self {
        Self {
            max_runs: max_runs.max(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, task_id: &str, record: RunRecord) {
        let mut inner = self.inner.write().unwrap();
        let runs = inner.entry(task_id.to_string()).or_default();
        runs.push(record);
        while runs.len() > self.max_runs {
            runs.remove(0);
        }
    }

    pub fn runs(&self, task_id: &str) -> Option<Vec<RunRecord>> {
        let inner = self.inner.read().unwrap();
        inner.get(task_id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, Vec<RunRecord>> {
        self.inner.read().unwrap().clone()
    }
}
