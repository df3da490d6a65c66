use crate::bus::{self, EventBus};
use crate::cache::LruCache;
use crate::executor::Executor;
use crate::history::{ResultHistory, RunRecord};
use crate::observability::{metrics::Metrics, Logger};
use crate::protocol::{map_status_to_task_state, Event, TaskSpec, TaskState};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};

#[derive(Clone)]
pub struct PoolContext {
    pub executor: Executor,
    pub bus: Arc<EventBus>,
    pub history: Arc<ResultHistory>,
    pub metrics: Arc<Metrics>,
    pub logger: Logger,
    pub semaphore: Arc<Semaphore>,
    pub max_concurrency: usize,
    pub default_timeout_ms: u64,
    pub dedup_capacity: usize,
}

/// Dispatch loop: pull runs off the queue, dedup, cap concurrency with the
/// semaphore, and execute each run with timeout and panic capture. Queued
/// runs still in the channel when the loop stops are recorded as cancelled.
pub async fn run_dispatch(
    ctx: PoolContext,
    mut queue_rx: mpsc::Receiver<TaskSpec>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut dedup: LruCache<String, ()> = LruCache::new(ctx.dedup_capacity);
    loop {
        let spec = tokio::select! {
            _ = shutdown_rx.recv() => break,
            next = queue_rx.recv() => match next {
                Some(spec) => spec,
                None => break,
            },
        };

        if dedup.get(&spec.run_id).is_some() {
            ctx.metrics.tasks_deduped.inc();
            ctx.logger.info("Duplicate run detected, skipping", Some(&json!({
                "task_id": spec.task_id,
                "run_id": spec.run_id
            })));
            continue;
        }
        dedup.insert(spec.run_id.clone(), ());

        ctx.metrics.tasks_received.inc();
        publish_state(&ctx, &spec, TaskState::Queued, None);

        // Backpressure via semaphore
        let permit = match ctx.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                ctx.logger.info("Backpressure: concurrency limit reached, waiting for a slot", Some(&json!({
                    "task_id": spec.task_id,
                    "max_concurrency": ctx.max_concurrency
                })));
                ctx.semaphore.clone().acquire_owned().await.unwrap()
            }
        };
        let in_use = ctx.max_concurrency.saturating_sub(ctx.semaphore.available_permits());
        ctx.metrics.tasks_in_progress.set(in_use as i64);

        publish_state(&ctx, &spec, TaskState::Running, None);

        let ctx_run = ctx.clone();
        tokio::spawn(async move {
            run_one(&ctx_run, spec).await;
            drop(permit);
            let in_use = ctx_run.max_concurrency.saturating_sub(ctx_run.semaphore.available_permits());
            ctx_run.metrics.tasks_in_progress.set(in_use as i64);
        });
    }

    queue_rx.close();
    drain_cancelled(&ctx, &mut queue_rx);
    ctx.logger.info("Dispatch loop stopped", None);
}

async fn run_one(ctx: &PoolContext, spec: TaskSpec) {
    let timeout_ms = spec
        .timeout_ms
        .map(|t| t.min(ctx.default_timeout_ms))
        .unwrap_or(ctx.default_timeout_ms);

    let executor = ctx.executor.clone();
    let exec_spec = spec.clone();
    let mut handle = tokio::spawn(async move { executor.execute(exec_spec).await });
    let started = std::time::Instant::now();

    let (state, error, latency_ms) =
        match tokio::time::timeout(Duration::from_millis(timeout_ms), &mut handle).await {
            Ok(Ok(outcome)) => {
                let state = map_status_to_task_state(&outcome.status);
                ctx.logger.info("Task finished", Some(&json!({
                    "task_id": outcome.task_id,
                    "run_id": outcome.run_id,
                    "state": serde_json::to_string(&state).unwrap_or_default(),
                    "latency_ms": outcome.latency_ms
                })));
                (state, outcome.error_message.clone(), Some(outcome.latency_ms))
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    let msg = panic_message(join_err);
                    ctx.logger.error("Task panicked", Some(&json!({
                        "task_id": spec.task_id,
                        "run_id": spec.run_id,
                        "error": msg
                    })));
                    (TaskState::Panicked, Some(msg), Some(started.elapsed().as_millis() as u64))
                } else {
                    (TaskState::Failed, Some(join_err.to_string()), Some(started.elapsed().as_millis() as u64))
                }
            }
            Err(_) => {
                handle.abort();
                ctx.logger.error("Task timed out", Some(&json!({
                    "task_id": spec.task_id,
                    "run_id": spec.run_id,
                    "timeout_ms": timeout_ms
                })));
                (TaskState::Timeout, Some(format!("timed out after {}ms", timeout_ms)), Some(timeout_ms))
            }
        };

    match state {
        TaskState::Completed => ctx.metrics.tasks_completed.inc(),
        TaskState::Failed => ctx.metrics.tasks_failed.inc(),
        TaskState::Timeout => ctx.metrics.tasks_timeout.inc(),
        TaskState::Panicked => ctx.metrics.tasks_panicked.inc(),
        _ => {}
    }
    if let Some(ms) = latency_ms {
        ctx.metrics.task_duration_seconds.observe(ms as f64 / 1000.0);
    }

    publish_state(ctx, &spec, state.clone(), error.clone());
    ctx.history.record(&spec.task_id, RunRecord {
        ts: Utc::now().to_rfc3339(),
        run_id: spec.run_id.clone(),
        state,
        error,
        latency_ms,
    });
}

fn drain_cancelled(ctx: &PoolContext, queue_rx: &mut mpsc::Receiver<TaskSpec>) {
    while let Ok(spec) = queue_rx.try_recv() {
        ctx.metrics.tasks_cancelled.inc();
        publish_state(ctx, &spec, TaskState::Cancelled, Some("shutdown before start".to_string()));
        ctx.history.record(&spec.task_id, RunRecord {
            ts: Utc::now().to_rfc3339(),
            run_id: spec.run_id.clone(),
            state: TaskState::Cancelled,
            error: Some("shutdown before start".to_string()),
            latency_ms: None,
        });
    }
}

fn publish_state(ctx: &PoolContext, spec: &TaskSpec, state: TaskState, error: Option<String>) {
    ctx.bus.publish(bus::TASK_STATE, Event::TaskStateChanged {
        task_id: spec.task_id.clone(),
        run_id: spec.run_id.clone(),
        name: spec.name.clone(),
        state,
        error,
    });
    ctx.metrics.bus_events_published_total.inc();
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}
