use crate::observability::Logger;
use crate::protocol::TaskSpec;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Periodic task templates grouped by period. A template with period P fires
/// on every second divisible by P; each firing enqueues a fresh run.
pub struct Scheduler {
    tasks: HashMap<u64, Vec<TaskSpec>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { tasks: HashMap::new() }
    }

    pub fn register(&mut self, spec: TaskSpec) -> Result<(), String> {
        let period = spec
            .period_secs
            .ok_or_else(|| "periodic task requires period_secs".to_string())?;
        if period == 0 {
            return Err("period_secs must be >= 1".to_string());
        }
        self.tasks.entry(period).or_default().push(spec);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tick loop. A tick interval shorter than one second must not double-
    /// fire, so at most one dispatch round runs per distinct unix second.
    /// Sending into a full queue awaits; due tasks are never dropped.
    pub async fn run(
        self,
        queue_tx: mpsc::Sender<TaskSpec>,
        mut shutdown_rx: broadcast::Receiver<()>,
        logger: Logger,
        tick: Duration,
    ) {
        let mut interval = tokio::time::interval(tick);
        let mut last_round_secs: i64 = i64::MIN;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    logger.info("Scheduler stopped", None);
                    break;
                }
                _ = interval.tick() => {
                    let now_secs = Utc::now().timestamp();
                    if now_secs == last_round_secs {
                        continue;
                    }
                    last_round_secs = now_secs;
                    for (&period, templates) in &self.tasks {
                        if now_secs % period as i64 != 0 {
                            continue;
                        }
                        for template in templates {
                            let spec = template.fresh_run();
                            if queue_tx.send(spec).await.is_err() {
                                logger.error("Task queue closed, scheduler exiting", Some(&json!({
                                    "period_secs": period
                                })));
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Job;
    use serde_json::json;

    fn template(name: &str, period: u64) -> TaskSpec {
        TaskSpec::periodic(
            name.to_string(),
            Job { kind: "echo".to_string(), payload: json!({}) },
            period,
        )
    }

    #[test]
    fn test_register_requires_period() {
        let mut s = Scheduler::new();
        let one_shot = TaskSpec::one_shot(
            "once".to_string(),
            Job { kind: "echo".to_string(), payload: json!({}) },
            None,
        );
        assert!(s.register(one_shot).is_err());

        let mut zero = template("never", 1);
        zero.period_secs = Some(0);
        assert!(s.register(zero).is_err());

        assert!(s.register(template("each-second", 1)).is_ok());
        assert_eq!(s.len(), 1);
    }

    #[tokio::test]
    async fn test_fires_with_fresh_run_ids() {
        let mut s = Scheduler::new();
        s.register(template("tick", 1)).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(s.run(
            tx,
            stop_tx.subscribe(),
            Logger::new("conductor-test".to_string()),
            Duration::from_millis(50),
        ));

        let first = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.task_id, second.task_id);
        assert!(!first.run_id.is_empty());
        assert_ne!(first.run_id, second.run_id);

        let _ = stop_tx.send(());
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_same_period_templates_fire_together() {
        let mut s = Scheduler::new();
        s.register(template("a", 1)).unwrap();
        s.register(template("b", 1)).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(s.run(
            tx,
            stop_tx.subscribe(),
            Logger::new("conductor-test".to_string()),
            Duration::from_millis(50),
        ));

        let mut names = vec![
            tokio::time::timeout(Duration::from_secs(3), rx.recv()).await.unwrap().unwrap().name,
            tokio::time::timeout(Duration::from_secs(3), rx.recv()).await.unwrap().unwrap().name,
        ];
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        let _ = stop_tx.send(());
        let _ = handle.await;
    }
}
