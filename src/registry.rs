use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service_name: String,
    pub alive: bool,
    pub last_seen_ms: u64,
}

/// Heartbeat-based liveness registry. A service is alive while its last
/// heartbeat is younger than the TTL; there is no reaper, liveness is
/// computed on read.
pub struct ServiceRegistry {
    ttl: Duration,
    services: RwLock<HashMap<String, Instant>>,
}

impl ServiceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Registers or re-registers a service, refreshing its heartbeat.
    pub fn register(&self, name: &str) {
        let mut services = self.services.write().unwrap();
        services.insert(name.to_string(), Instant::now());
    }

    pub fn heartbeat(&self, name: &str) -> Result<(), String> {
        let mut services = self.services.write().unwrap();
        match services.get_mut(name) {
            Some(last_seen) => {
                *last_seen = Instant::now();
                Ok(())
            }
            None => Err(format!("no service with name {} found", name)),
        }
    }

    pub fn is_alive(&self, name: &str) -> bool {
        let services = self.services.read().unwrap();
        services
            .get(name)
            .map(|last_seen| last_seen.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.services.read().unwrap().contains_key(name)
    }

    pub fn snapshot(&self) -> Vec<ServiceStatus> {
        let services = self.services.read().unwrap();
        let mut statuses: Vec<ServiceStatus> = services
            .iter()
            .map(|(name, last_seen)| ServiceStatus {
                service_name: name.clone(),
                alive: last_seen.elapsed() < self.ttl,
                last_seen_ms: last_seen.elapsed().as_millis() as u64,
            })
            .collect();
        statuses.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        statuses
    }

    pub fn alive_count(&self) -> usize {
        let services = self.services.read().unwrap();
        services
            .values()
            .filter(|last_seen| last_seen.elapsed() < self.ttl)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_alive() {
        let registry = ServiceRegistry::new(Duration::from_secs(5));
        registry.register("billing");
        assert!(registry.is_alive("billing"));
        assert!(!registry.is_alive("unknown"));
    }

    #[test]
    fn test_heartbeat_unknown_service() {
        let registry = ServiceRegistry::new(Duration::from_secs(5));
        let err = registry.heartbeat("ghost").unwrap_err();
        assert!(err.contains("ghost"));
    }

    #[test]
    fn test_expires_after_ttl() {
        let registry = ServiceRegistry::new(Duration::from_millis(40));
        registry.register("billing");
        std::thread::sleep(Duration::from_millis(80));
        assert!(!registry.is_alive("billing"));
        assert!(registry.is_known("billing"));

        registry.heartbeat("billing").unwrap();
        assert!(registry.is_alive("billing"));
    }

    #[test]
    fn test_snapshot_sorted() {
        let registry = ServiceRegistry::new(Duration::from_secs(5));
        registry.register("zeta");
        registry.register("alpha");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].service_name, "alpha");
        assert!(snapshot[0].alive);
        assert_eq!(registry.alive_count(), 2);
    }
}
