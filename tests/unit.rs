use conductor::protocol::{
    map_status_to_task_state, Event, Job, TaskSpec, TaskState, TaskStatus,
};
use serde_json::json;

#[test]
fn spec_roundtrip_one_shot() {
    let spec = TaskSpec::one_shot(
        "welcome".into(),
        Job { kind: "email".into(), payload: json!({"to": "a@b.io"}) },
        Some(250),
    );
    let encoded = serde_json::to_string(&spec).unwrap();
    let parsed: TaskSpec = serde_json::from_str(&encoded).unwrap();
    assert_eq!(parsed.task_id, spec.task_id);
    assert_eq!(parsed.run_id, spec.run_id);
    assert_eq!(parsed.job.kind, "email");
    assert_eq!(parsed.timeout_ms, Some(250));
}

#[test]
fn status_to_state_mapping() {
    assert!(matches!(map_status_to_task_state(&TaskStatus::Success), TaskState::Completed));
    assert!(matches!(map_status_to_task_state(&TaskStatus::Error), TaskState::Failed));
    assert!(matches!(map_status_to_task_state(&TaskStatus::Timeout), TaskState::Timeout));
    assert!(matches!(map_status_to_task_state(&TaskStatus::Panicked), TaskState::Panicked));
}

#[test]
fn event_wire_format() {
    let event = Event::ServiceObserved { service: "billing".into(), alive: false };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["kind"], "service_observed");
    assert_eq!(value["service"], "billing");
    assert_eq!(value["alive"], false);

    let heartbeat: Event = serde_json::from_value(json!({
        "kind": "heartbeat",
        "node_id": "conductor-1",
        "timestamp": "2024-01-01T00:00:00Z",
        "status": "idle",
        "load": 0.25
    }))
    .unwrap();
    assert!(matches!(heartbeat, Event::Heartbeat { .. }));
}
