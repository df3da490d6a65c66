use prometheus::{
    Encoder, Histogram, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    pub tasks_received: IntCounter,
    pub tasks_completed: IntCounter,
    pub tasks_failed: IntCounter,
    pub tasks_timeout: IntCounter,
    pub tasks_panicked: IntCounter,
    pub tasks_deduped: IntCounter,
    pub tasks_cancelled: IntCounter,
    pub tasks_in_progress: IntGauge,
    pub submissions_shed_total: IntCounter,
    pub probe_attempts_total: IntCounter,
    pub probe_failures_total: IntCounter,
    pub rate_limited_total: IntCounter,
    pub bus_events_published_total: IntCounter,
    pub services_alive: IntGauge,
    pub scheduled_tasks: IntGauge,
    pub task_duration_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let tasks_received = IntCounter::new("tasks_received", "Task runs received by the dispatch loop").unwrap();
        let tasks_completed = IntCounter::new("tasks_completed", "Task runs completed").unwrap();
        let tasks_failed = IntCounter::new("tasks_failed", "Task runs failed").unwrap();
        let tasks_timeout = IntCounter::new("tasks_timeout", "Task runs timed out").unwrap();
        let tasks_panicked = IntCounter::new("tasks_panicked", "Task runs that panicked").unwrap();
        let tasks_deduped = IntCounter::new("tasks_deduped", "Duplicate runs skipped").unwrap();
        let tasks_cancelled = IntCounter::new("tasks_cancelled", "Queued runs cancelled at shutdown").unwrap();
        let tasks_in_progress = IntGauge::new("tasks_in_progress", "Currently running tasks").unwrap();
        let submissions_shed_total = IntCounter::new("submissions_shed_total", "Task submissions rejected under load").unwrap();
        let probe_attempts_total = IntCounter::new("probe_attempts_total", "Outgoing probe attempts").unwrap();
        let probe_failures_total = IntCounter::new("probe_failures_total", "Outgoing probe failures").unwrap();
        let rate_limited_total = IntCounter::new("rate_limited_total", "Outgoing requests delayed by the rate limiter").unwrap();
        let bus_events_published_total = IntCounter::new("bus_events_published_total", "Events published on the bus").unwrap();
        let services_alive = IntGauge::new("services_alive", "Registered services currently alive").unwrap();
        let scheduled_tasks = IntGauge::new("scheduled_tasks", "Periodic task templates registered").unwrap();
        let task_duration_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new("task_duration_seconds", "Task execution duration in seconds")
        ).unwrap();

        registry.register(Box::new(tasks_received.clone())).unwrap();
        registry.register(Box::new(tasks_completed.clone())).unwrap();
        registry.register(Box::new(tasks_failed.clone())).unwrap();
        registry.register(Box::new(tasks_timeout.clone())).unwrap();
        registry.register(Box::new(tasks_panicked.clone())).unwrap();
        registry.register(Box::new(tasks_deduped.clone())).unwrap();
        registry.register(Box::new(tasks_cancelled.clone())).unwrap();
        registry.register(Box::new(tasks_in_progress.clone())).unwrap();
        registry.register(Box::new(submissions_shed_total.clone())).unwrap();
        registry.register(Box::new(probe_attempts_total.clone())).unwrap();
        registry.register(Box::new(probe_failures_total.clone())).unwrap();
        registry.register(Box::new(rate_limited_total.clone())).unwrap();
        registry.register(Box::new(bus_events_published_total.clone())).unwrap();
        registry.register(Box::new(services_alive.clone())).unwrap();
        registry.register(Box::new(scheduled_tasks.clone())).unwrap();
        registry.register(Box::new(task_duration_seconds.clone())).unwrap();

        Self {
            registry,
            tasks_received,
            tasks_completed,
            tasks_failed,
            tasks_timeout,
            tasks_panicked,
            tasks_deduped,
            tasks_cancelled,
            tasks_in_progress,
            submissions_shed_total,
            probe_attempts_total,
            probe_failures_total,
            rate_limited_total,
            bus_events_published_total,
            services_alive,
            scheduled_tasks,
            task_duration_seconds,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or(());
        buffer
    }
}
