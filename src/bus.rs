use crate::protocol::Event;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const TASK_STATE: &str = "task.state";
pub const HEARTBEAT: &str = "heartbeat";
pub const SERVICE: &str = "service";

/// In-process topic bus. Every subscriber of a topic receives every event
/// published on it; subscribers that dropped their receiver are pruned on the
/// next publish.
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<UnboundedSender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, topic: &str) -> UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.topics.write().unwrap();
        topics.entry(topic.to_string()).or_default().push(tx);
        rx
    }

    /// Returns the number of subscribers the event was delivered to.
    /// Publishing to a topic nobody listens on is not an error.
    pub fn publish(&self, topic: &str, event: Event) -> usize {
        let mut topics = self.topics.write().unwrap();
        let subscribers = match topics.get_mut(topic) {
            Some(s) => s,
            None => return 0,
        };
        subscribers.retain(|tx| !tx.is_closed());
        let mut delivered = 0;
        for tx in subscribers.iter() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap()
            .get(topic)
            .map(|s| s.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat() -> Event {
        Event::Heartbeat {
            node_id: "n1".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            status: "idle".to_string(),
            load: 0.0,
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe(HEARTBEAT);
        let mut rx2 = bus.subscribe(HEARTBEAT);

        let delivered = bus.publish(HEARTBEAT, heartbeat());
        assert_eq!(delivered, 2);
        assert!(matches!(rx1.recv().await, Some(Event::Heartbeat { .. })));
        assert!(matches!(rx2.recv().await, Some(Event::Heartbeat { .. })));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("nobody.home", heartbeat()), 0);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = EventBus::new();
        let mut task_rx = bus.subscribe(TASK_STATE);
        bus.publish(HEARTBEAT, heartbeat());
        assert!(task_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_pruned() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe(HEARTBEAT);
        let mut rx2 = bus.subscribe(HEARTBEAT);
        drop(rx1);

        let delivered = bus.publish(HEARTBEAT, heartbeat());
        assert_eq!(delivered, 1);
        assert_eq!(bus.subscriber_count(HEARTBEAT), 1);
        assert!(matches!(rx2.recv().await, Some(Event::Heartbeat { .. })));
    }
}
