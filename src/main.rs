mod balancer;
mod bus;
mod cache;
mod config;
mod error;
mod executor;
mod handlers;
mod health;
mod history;
mod limiter;
mod observability;
mod pool;
mod protocol;
mod registry;
mod scheduler;
mod shed;

use balancer::RoundRobin;
use bus::EventBus;
use config::Config;
use executor::Executor;
use handlers::http::ProbeContext;
use health::ApiState;
use history::ResultHistory;
use limiter::{FixedWindowLimiter, ThrottledClient};
use observability::{metrics::Metrics, Logger};
use pool::PoolContext;
use protocol::{Event, Job, TaskSpec};
use registry::ServiceRegistry;
use scheduler::Scheduler;
use shed::LoadShed;

use serde_json::json;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load Config
    let config = Config::from_env().expect("Failed to load configuration");

    // 2. Initialize Logger
    let logger = Logger::new(config.node_id.clone());
    logger.info("Conductor starting up", Some(&json!({
        "api_bind": config.api_bind,
        "max_concurrency": config.max_concurrency,
        "probe_targets": config.probe_targets.len()
    })));

    // 3. Shared state
    let metrics = Arc::new(Metrics::new());
    let readiness = Arc::new(AtomicBool::new(false));
    let draining = Arc::new(AtomicBool::new(false));
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(ServiceRegistry::new(Duration::from_millis(config.registry_ttl_ms)));
    let history = Arc::new(ResultHistory::new(config.history_max_runs));
    let (queue_tx, queue_rx) = mpsc::channel::<TaskSpec>(config.queue_capacity);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // 4. Start API server
    let api_bind = config.api_bind.clone();
    let api_state = ApiState {
        readiness: readiness.clone(),
        draining: draining.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: metrics.clone(),
        registry: registry.clone(),
        history: history.clone(),
        shed: LoadShed::new(config.shed_max_in_flight),
        submit_tx: queue_tx.clone(),
        max_concurrency: config.max_concurrency,
    };
    let api_logger = Logger::new(config.node_id.clone());
    tokio::spawn(async move {
        api_logger.info(&format!("API server listening on {}", api_bind), None);
        if let Err(e) = health::start_server(api_bind, api_state).await {
            api_logger.error(&format!("API server crashed: {}", e), None);
            std::process::exit(1);
        }
    });

    // 5. Event log consumers, one per topic
    for topic in [bus::TASK_STATE, bus::HEARTBEAT, bus::SERVICE] {
        let mut rx = bus.subscribe(topic);
        let event_logger = Logger::new(config.node_id.clone());
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                event_logger.info("Event", Some(&json!({"topic": topic, "event": event})));
            }
        });
    }

    // 6. Self-registration
    registry.register(&config.node_id);

    // 7. Executor with throttled probe client
    let targets = Arc::new(RoundRobin::from_items(config.probe_targets.clone()));
    let probe_ctx = ProbeContext {
        client: ThrottledClient::new(
            FixedWindowLimiter::new(
                config.rate_limit_max,
                Duration::from_secs(config.rate_limit_window_secs),
            ),
            metrics.clone(),
        ),
        targets,
        registry: registry.clone(),
        bus: bus.clone(),
        metrics: metrics.clone(),
        max_retries: config.probe_max_retries,
    };
    let executor = Executor::new(config.node_id.clone(), probe_ctx, logger.clone());

    // 8. Register built-in probe tasks
    let mut scheduler = Scheduler::new();
    for target in &config.probe_targets {
        let service = service_name(target);
        let spec = TaskSpec::periodic(
            format!("probe-{}", service),
            Job {
                kind: "http".to_string(),
                payload: json!({"url": target, "service": service}),
            },
            config.probe_period_secs,
        );
        if let Err(e) = scheduler.register(spec) {
            logger.error(&format!("Failed to register probe task: {}", e), None);
        }
    }
    metrics.scheduled_tasks.set(scheduler.len() as i64);

    // 9. Pool dispatch loop
    let pool_ctx = PoolContext {
        executor,
        bus: bus.clone(),
        history: history.clone(),
        metrics: metrics.clone(),
        logger: logger.clone(),
        semaphore: semaphore.clone(),
        max_concurrency: config.max_concurrency,
        default_timeout_ms: config.default_task_timeout_ms,
        dedup_capacity: config.dedup_capacity,
    };
    let dispatch_handle = tokio::spawn(pool::run_dispatch(pool_ctx, queue_rx, shutdown_tx.subscribe()));

    // 10. Scheduler loop
    tokio::spawn(scheduler.run(
        queue_tx.clone(),
        shutdown_tx.subscribe(),
        Logger::new(config.node_id.clone()),
        Duration::from_millis(config.tick_interval_ms),
    ));

    // 11. Heartbeat loop with dynamic load/status
    {
        let heartbeat_semaphore = semaphore.clone();
        let heartbeat_bus = bus.clone();
        let heartbeat_registry = registry.clone();
        let heartbeat_metrics = metrics.clone();
        let heartbeat_draining = draining.clone();
        let node_id = config.node_id.clone();
        let max_permits = config.max_concurrency;
        let interval_ms = config.heartbeat_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                let available = heartbeat_semaphore.available_permits();
                let in_use = max_permits.saturating_sub(available);
                let load = if max_permits == 0 { 0.0 } else { (in_use as f64) / (max_permits as f64) };
                let status = if heartbeat_draining.load(Ordering::SeqCst) {
                    "draining".to_string()
                } else if in_use > 0 {
                    "busy".to_string()
                } else {
                    "idle".to_string()
                };
                heartbeat_bus.publish(bus::HEARTBEAT, Event::Heartbeat {
                    node_id: node_id.clone(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    status,
                    load,
                });
                heartbeat_metrics.bus_events_published_total.inc();
                let _ = heartbeat_registry.heartbeat(&node_id);
                heartbeat_metrics.services_alive.set(heartbeat_registry.alive_count() as i64);
            }
        });
    }

    readiness.store(true, Ordering::SeqCst);
    logger.info("Conductor ready", Some(&json!({
        "scheduled_tasks": metrics.scheduled_tasks.get()
    })));

    // 12. Wait for shutdown signal, then drain
    tokio::signal::ctrl_c().await?;
    readiness.store(false, Ordering::SeqCst);
    draining.store(true, Ordering::SeqCst);
    let _ = shutdown_tx.send(());

    let available = semaphore.available_permits();
    let in_use = config.max_concurrency.saturating_sub(available);
    let load = if config.max_concurrency == 0 { 0.0 } else { (in_use as f64) / (config.max_concurrency as f64) };
    bus.publish(bus::HEARTBEAT, Event::Heartbeat {
        node_id: config.node_id.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        status: "draining".to_string(),
        load,
    });
    metrics.bus_events_published_total.inc();

    let grace = Duration::from_millis(config.shutdown_grace_ms);
    let drained = tokio::time::timeout(grace, async {
        let _ = dispatch_handle.await;
        let _ = semaphore.clone().acquire_many_owned(config.max_concurrency as u32).await;
    })
    .await;
    match drained {
        Ok(()) => logger.info("Drained all in-flight tasks", None),
        Err(_) => logger.error(&format!(
            "Shutdown grace of {}ms elapsed with tasks still running",
            config.shutdown_grace_ms
        ), None),
    }

    bus.publish(bus::HEARTBEAT, Event::Heartbeat {
        node_id: config.node_id.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        status: "stopped".to_string(),
        load: 0.0,
    });
    metrics.bus_events_published_total.inc();
    logger.info("Conductor shutdown", None);

    Ok(())
}

/// Registry name for a probe target URL: the host/port part with characters
/// unsafe for a service name replaced.
fn service_name(target: &str) -> String {
    let stripped = target
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split('/').next().unwrap_or(stripped);
    host.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod main_tests {
    use super::*;

    #[test]
    fn test_service_name_from_target() {
        assert_eq!(service_name("http://billing.internal:8080"), "billing.internal-8080");
        assert_eq!(service_name("https://api.example.com/health"), "api.example.com");
        assert_eq!(service_name("http://10.0.0.7"), "10.0.0.7");
    }
}
