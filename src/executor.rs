use crate::handlers;
use crate::handlers::http::ProbeContext;
use crate::observability::Logger;
use crate::protocol::{TaskOutcome, TaskSpec, TaskStatus};
use chrono::Utc;

#[derive(Clone)]
pub struct Executor {
    node_id: String,
    probe: ProbeContext,
    logger: Logger,
}

impl Executor {
    pub fn new(node_id: String, probe: ProbeContext, logger: Logger) -> Self {
        Self { node_id, probe, logger }
    }

    pub fn id(&self) -> &str {
        &self.node_id
    }

    pub async fn execute(&self, spec: TaskSpec) -> TaskOutcome {
        let start = std::time::Instant::now();

        let (status, output, error_code, error_message) = match spec.job.kind.as_str() {
            "echo" => handlers::common::handle_echo(&spec.job).await,
            "sleep" => handlers::common::handle_sleep(&spec.job).await,
            "simulate" => handlers::common::handle_simulate(&spec.job).await,
            "email" => handlers::email::handle_email(&self.logger, &spec.job).await,
            "http" => handlers::http::handle_probe(&self.probe, &spec.job).await,
            _ => (
                TaskStatus::Error,
                None,
                Some("UNKNOWN_JOB_KIND".to_string()),
                Some(format!("Unknown job kind: {}", spec.job.kind)),
            ),
        };

        let duration = start.elapsed();

        TaskOutcome {
            task_id: spec.task_id,
            run_id: spec.run_id,
            name: spec.name,
            status,
            node_id: self.node_id.clone(),
            job_kind: spec.job.kind,
            output,
            latency_ms: duration.as_millis() as u64,
            error_code,
            error_message,
            finished_at: Utc::now().to_rfc3339(),
        }
    }
}
