use crate::observability::{pii, Logger};
use crate::protocol::{Job, TaskStatus};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use super::HandlerResult;

/// Simulated email delivery. The recipient is validated up front and never
/// reaches the log output unmasked.
pub async fn handle_email(logger: &Logger, job: &Job) -> HandlerResult {
    let to = match job.payload.get("to").and_then(|v| v.as_str()) {
        Some(t) => t,
        None => return (
            TaskStatus::Error,
            None,
            Some("MISSING_RECIPIENT".to_string()),
            Some("Missing 'to' in payload".to_string()),
        ),
    };

    if !pii::is_email(to) {
        return (
            TaskStatus::Error,
            None,
            Some("INVALID_RECIPIENT".to_string()),
            Some("Recipient is not a valid email address".to_string()),
        );
    }

    let ms = job.payload.get("ms").and_then(|v| v.as_u64()).unwrap_or(25);
    sleep(Duration::from_millis(ms)).await;

    if job.payload.get("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
        return (
            TaskStatus::Error,
            None,
            Some("DELIVERY_FAILED".to_string()),
            Some("delivery rejected by upstream".to_string()),
        );
    }

    logger.info("Email delivered", Some(&json!({"to": to})));
    (
        TaskStatus::Success,
        Some(json!({"to": pii::mask_pii(to), "delivered": true})),
        None,
        None,
    )
}
