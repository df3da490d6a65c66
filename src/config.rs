use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: String,
    pub api_bind: String,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    pub default_task_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub registry_ttl_ms: u64,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub shed_max_in_flight: usize,
    pub probe_targets: Vec<String>,
    pub probe_period_secs: u64,
    pub probe_max_retries: u32,
    pub dedup_capacity: usize,
    pub history_max_runs: usize,
    pub shutdown_grace_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let node_id = env::var("CONDUCTOR_ID")
            .unwrap_or_else(|_| format!("conductor-{}", uuid::Uuid::new_v4()));
        if node_id.trim().is_empty() {
            return Err("CONDUCTOR_ID cannot be empty".to_string());
        }

        let api_bind = env::var("API_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        if api_bind.trim().is_empty() {
            return Err("API_BIND cannot be empty".to_string());
        }

        let max_concurrency = env::var("MAX_CONCURRENCY")
            .unwrap_or_else(|_| "8".to_string())
            .parse::<usize>()
            .map_err(|_| "MAX_CONCURRENCY must be a number".to_string())?;
        if !(1..=256).contains(&max_concurrency) {
            return Err("MAX_CONCURRENCY must be between 1 and 256".to_string());
        }

        let queue_capacity = env::var("QUEUE_CAPACITY")
            .unwrap_or_else(|_| "64".to_string())
            .parse::<usize>()
            .map_err(|_| "QUEUE_CAPACITY must be a number".to_string())?;
        if !(1..=10_000).contains(&queue_capacity) {
            return Err("QUEUE_CAPACITY must be between 1 and 10000".to_string());
        }

        let default_task_timeout_ms = env::var("DEFAULT_TASK_TIMEOUT_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse::<u64>()
            .map_err(|_| "DEFAULT_TASK_TIMEOUT_MS must be a number".to_string())?;
        if !(100..=3_600_000).contains(&default_task_timeout_ms) {
            return Err("DEFAULT_TASK_TIMEOUT_MS must be between 100 and 3600000".to_string());
        }

        let tick_interval_ms = env::var("TICK_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<u64>()
            .map_err(|_| "TICK_INTERVAL_MS must be a number".to_string())?;
        if !(100..=60_000).contains(&tick_interval_ms) {
            return Err("TICK_INTERVAL_MS must be between 100 and 60000".to_string());
        }

        let heartbeat_interval_ms = env::var("HEARTBEAT_INTERVAL_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .map_err(|_| "HEARTBEAT_INTERVAL_MS must be a number".to_string())?;
        if !(100..=600_000).contains(&heartbeat_interval_ms) {
            return Err("HEARTBEAT_INTERVAL_MS must be between 100 and 600000".to_string());
        }

        let registry_ttl_ms = env::var("REGISTRY_TTL_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .map_err(|_| "REGISTRY_TTL_MS must be a number".to_string())?;
        if !(100..=600_000).contains(&registry_ttl_ms) {
            return Err("REGISTRY_TTL_MS must be between 100 and 600000".to_string());
        }

        let rate_limit_max = env::var("RATE_LIMIT_MAX")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<u32>()
            .map_err(|_| "RATE_LIMIT_MAX must be a number".to_string())?;
        if !(1..=100_000).contains(&rate_limit_max) {
            return Err("RATE_LIMIT_MAX must be between 1 and 100000".to_string());
        }

        let rate_limit_window_secs = env::var("RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map_err(|_| "RATE_LIMIT_WINDOW_SECS must be a number".to_string())?;
        if !(1..=3600).contains(&rate_limit_window_secs) {
            return Err("RATE_LIMIT_WINDOW_SECS must be between 1 and 3600".to_string());
        }

        let shed_max_in_flight = env::var("SHED_MAX_IN_FLIGHT")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<usize>()
            .map_err(|_| "SHED_MAX_IN_FLIGHT must be a number".to_string())?;
        if !(1..=10_000).contains(&shed_max_in_flight) {
            return Err("SHED_MAX_IN_FLIGHT must be between 1 and 10000".to_string());
        }

        let probe_targets = parse_targets(&env::var("PROBE_TARGETS").unwrap_or_default())?;

        let probe_period_secs = env::var("PROBE_PERIOD_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse::<u64>()
            .map_err(|_| "PROBE_PERIOD_SECS must be a number".to_string())?;
        if !(1..=86_400).contains(&probe_period_secs) {
            return Err("PROBE_PERIOD_SECS must be between 1 and 86400".to_string());
        }

        let probe_max_retries = env::var("PROBE_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .map_err(|_| "PROBE_MAX_RETRIES must be a number".to_string())?;
        if !(0..=10).contains(&probe_max_retries) {
            return Err("PROBE_MAX_RETRIES must be between 0 and 10".to_string());
        }

        let dedup_capacity = env::var("DEDUP_CAPACITY")
            .unwrap_or_else(|_| "4096".to_string())
            .parse::<usize>()
            .map_err(|_| "DEDUP_CAPACITY must be a number".to_string())?;
        if !(16..=1_000_000).contains(&dedup_capacity) {
            return Err("DEDUP_CAPACITY must be between 16 and 1000000".to_string());
        }

        let history_max_runs = env::var("HISTORY_MAX_RUNS")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<usize>()
            .map_err(|_| "HISTORY_MAX_RUNS must be a number".to_string())?;
        if !(1..=10_000).contains(&history_max_runs) {
            return Err("HISTORY_MAX_RUNS must be between 1 and 10000".to_string());
        }

        let shutdown_grace_ms = env::var("SHUTDOWN_GRACE_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .map_err(|_| "SHUTDOWN_GRACE_MS must be a number".to_string())?;
        if !(100..=600_000).contains(&shutdown_grace_ms) {
            return Err("SHUTDOWN_GRACE_MS must be between 100 and 600000".to_string());
        }

        Ok(Config {
            node_id,
            api_bind,
            max_concurrency,
            queue_capacity,
            default_task_timeout_ms,
            tick_interval_ms,
            heartbeat_interval_ms,
            registry_ttl_ms,
            rate_limit_max,
            rate_limit_window_secs,
            shed_max_in_flight,
            probe_targets,
            probe_period_secs,
            probe_max_retries,
            dedup_capacity,
            history_max_runs,
            shutdown_grace_ms,
        })
    }
}

fn parse_targets(raw: &str) -> Result<Vec<String>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut targets = Vec::new();
    for entry in raw.split(',') {
        let t = entry.trim();
        if t.is_empty() {
            return Err("PROBE_TARGETS contains an empty entry".to_string());
        }
        if !t.starts_with("http://") && !t.starts_with("https://") {
            return Err(format!("PROBE_TARGETS entry '{}' must start with http:// or https://", t));
        }
        targets.push(t.to_string());
    }
    Ok(targets)
}
