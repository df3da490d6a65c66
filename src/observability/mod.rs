pub mod pii;
pub mod metrics;

use chrono::Utc;
use serde_json::{json, Value};
use self::pii::mask_pii;

#[derive(Clone)]
pub struct Logger {
    node_id: String,
}

impl Logger {
    pub fn new(node_id: String) -> Self {
        Self { node_id }
    }

    pub fn info(&self, msg: &str, context: Option<&Value>) {
        let entry = self.build_entry("INFO", msg, context);
        println!("{}", serde_json::to_string(&entry).unwrap_or_default());
    }

    pub fn error(&self, msg: &str, context: Option<&Value>) {
        let entry = self.build_entry("ERROR", msg, context);
        eprintln!("{}", serde_json::to_string(&entry).unwrap_or_default());
    }

    fn build_entry(&self, level: &str, msg: &str, context: Option<&Value>) -> Value {
        let now = Utc::now().to_rfc3339();
        let safe_msg = mask_pii(msg);

        let mut base = json!({
            "ts": now,
            "level": level,
            "msg": safe_msg,
            "node_id": self.node_id,
        });

        if let Some(ctx) = context {
            if let Some(base_obj) = base.as_object_mut() {
                if let Some(ctx_obj) = ctx.as_object() {
                    for (k, v) in ctx_obj {
                        // Apply PII masking to string values in context
                        let safe_v = if let Some(s) = v.as_str() {
                            json!(mask_pii(s))
                        } else {
                            v.clone()
                        };
                        base_obj.insert(k.clone(), safe_v);
                    }
                }
            }
        }

        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_structure() {
        let logger = Logger::new("conductor-test".to_string());
        let context = json!({"task_id": "t-1", "recipient": "admin@example.com"});

        let entry = logger.build_entry("INFO", "Delivery to user@example.com", Some(&context));

        assert_eq!(entry["level"], "INFO");
        assert_eq!(entry["node_id"], "conductor-test");
        assert!(entry["ts"].is_string());

        // Check PII masking in msg
        assert_eq!(entry["msg"], "Delivery to ***@***.***");

        // Check PII masking in context
        assert_eq!(entry["task_id"], "t-1");
        assert_eq!(entry["recipient"], "***@***.***");
    }
}
