use crate::balancer::RoundRobin;
use crate::bus::{self, EventBus};
use crate::error::classify_probe_error;
use crate::limiter::ThrottledClient;
use crate::observability::metrics::Metrics;
use crate::protocol::{Event, Job, TaskStatus};
use crate::registry::ServiceRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use super::HandlerResult;

/// Everything the probe handler needs to reach the outside world.
#[derive(Clone)]
pub struct ProbeContext {
    pub client: ThrottledClient,
    pub targets: Arc<RoundRobin<String>>,
    pub registry: Arc<ServiceRegistry>,
    pub bus: Arc<EventBus>,
    pub metrics: Arc<Metrics>,
    pub max_retries: u32,
}

/// GET probe against an explicit `url`, or the next balancer target joined
/// with `path`. Transient failures and 5xx answers are retried with
/// exponential backoff. A reachable target counts as alive even on 4xx; when
/// the payload names a `service`, the observation lands in the registry and
/// on the bus.
pub async fn handle_probe(ctx: &ProbeContext, job: &Job) -> HandlerResult {
    let url = match job.payload.get("url").and_then(|v| v.as_str()) {
        Some(u) => u.to_string(),
        None => {
            let base = match ctx.targets.next() {
                Some(t) => t,
                None => return (
                    TaskStatus::Error,
                    None,
                    Some("NO_TARGET".to_string()),
                    Some("No 'url' in payload and no probe targets configured".to_string()),
                ),
            };
            let path = job.payload.get("path").and_then(|v| v.as_str()).unwrap_or("");
            join_url(&base, path)
        }
    };
    let service = job.payload.get("service").and_then(|v| v.as_str());

    let mut attempt: u32 = 0;
    loop {
        ctx.metrics.probe_attempts_total.inc();
        match ctx.client.get(&url).await {
            Ok(res) => {
                let status_code = res.status().as_u16();
                if res.status().is_server_error() {
                    ctx.metrics.probe_failures_total.inc();
                    if attempt < ctx.max_retries {
                        attempt += 1;
                        let backoff = Duration::from_millis(100 * 2_u64.pow(attempt));
                        sleep(backoff).await;
                        continue;
                    }
                    observe_service(ctx, service, false);
                    return (
                        TaskStatus::Error,
                        Some(json!({"status": status_code})),
                        Some("PROBE_BAD_STATUS".to_string()),
                        Some(format!("target answered {}", status_code)),
                    );
                }
                let body_text = res.text().await.unwrap_or_default();
                let body_json = serde_json::from_str::<Value>(&body_text)
                    .unwrap_or(Value::String(body_text));
                observe_service(ctx, service, true);
                return (
                    TaskStatus::Success,
                    Some(json!({"status": status_code, "body": body_json})),
                    None,
                    None,
                );
            }
            Err(e) => {
                ctx.metrics.probe_failures_total.inc();
                let classified = classify_probe_error(&e);
                if classified.is_transient() && attempt < ctx.max_retries {
                    attempt += 1;
                    let backoff = Duration::from_millis(100 * 2_u64.pow(attempt));
                    sleep(backoff).await;
                    continue;
                }
                observe_service(ctx, service, false);
                return (
                    TaskStatus::Error,
                    None,
                    Some("PROBE_FAILED".to_string()),
                    Some(e.to_string()),
                );
            }
        }
    }
}

fn observe_service(ctx: &ProbeContext, service: Option<&str>, alive: bool) {
    if let Some(name) = service {
        if alive {
            ctx.registry.register(name);
        }
        ctx.bus.publish(bus::SERVICE, Event::ServiceObserved {
            service: name.to_string(),
            alive,
        });
        ctx.metrics.bus_events_published_total.inc();
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
