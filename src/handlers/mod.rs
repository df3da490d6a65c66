use crate::protocol::TaskStatus;
use serde_json::Value;

pub type HandlerResult = (TaskStatus, Option<Value>, Option<String>, Option<String>);

pub mod common;
pub mod email;
pub mod http;
