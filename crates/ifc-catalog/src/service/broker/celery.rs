//! The Celery v2 JSON task-message envelope (spec §4.4).
//!
//! Modeled as a typed value rather than a stringly-typed map, per the design note —
//! this shape is an external contract with the worker fleet and must be preserved
//! bit-exact, so every field here mirrors the wire format exactly, including the
//! `null` fields Celery expects even though this system never populates them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const QUEUE_NAME: &str = "celery";
pub const IFC_PROCESSING_TASK: &str = "app.workers.ifc_processing.process_ifc_file";
pub const HEALTH_CHECK_TASK: &str = "app.workers.health.health_check";

pub fn result_key(task_id: Uuid) -> String {
    format!("celery-task-meta-{task_id}")
}

#[derive(Debug, Serialize, Deserialize)]
struct EmbeddedOptions {
    callbacks: Option<Value>,
    errbacks: Option<Value>,
    chain: Option<Value>,
    chord: Option<Value>,
}

impl Default for EmbeddedOptions {
    fn default() -> Self {
        Self {
            callbacks: None,
            errbacks: None,
            chain: None,
            chord: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Headers {
    pub lang: &'static str,
    pub task: String,
    pub id: Uuid,
    pub retries: u32,
    pub eta: Option<String>,
    pub expires: Option<String>,
    pub group: Option<String>,
    pub root_id: Uuid,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub exchange: &'static str,
    pub routing_key: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Properties {
    pub correlation_id: Uuid,
    pub reply_to: Uuid,
    pub delivery_mode: u8,
    pub delivery_info: DeliveryInfo,
    pub priority: u8,
    pub body_encoding: &'static str,
    pub delivery_tag: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub body: String,
    #[serde(rename = "content-encoding")]
    pub content_encoding: &'static str,
    #[serde(rename = "content-type")]
    pub content_type: &'static str,
    pub headers: Headers,
    pub properties: Properties,
}

/// Build a Celery v2 envelope dispatching `task_name(*args)` with no kwargs.
///
/// The `body` is the base64 of `[args, kwargs, {callbacks, errbacks, chain, chord}]`.
#[must_use]
pub fn build_envelope(task_name: &str, args: Vec<Value>) -> Envelope {
    let task_id = Uuid::now_v7();
    let body_array = serde_json::json!([args, Value::Object(serde_json::Map::new()), EmbeddedOptions::default()]);
    let body = STANDARD.encode(serde_json::to_vec(&body_array).expect("json array always serializes"));

    Envelope {
        body,
        content_encoding: "utf-8",
        content_type: "application/json",
        headers: Headers {
            lang: "py",
            task: task_name.to_string(),
            id: task_id,
            retries: 0,
            eta: None,
            expires: None,
            group: None,
            root_id: task_id,
            parent_id: None,
        },
        properties: Properties {
            correlation_id: task_id,
            reply_to: Uuid::new_v4(),
            delivery_mode: 2,
            delivery_info: DeliveryInfo {
                exchange: "",
                routing_key: "celery",
            },
            priority: 0,
            body_encoding: "base64",
            delivery_tag: Uuid::new_v4(),
        },
    }
}

#[must_use]
pub fn task_id_of(envelope: &Envelope) -> Uuid {
    envelope.headers.id
}

/// Task status as stored under `celery-task-meta-{task_id}` (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskState,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub children: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Started,
    Success,
    Failure,
    Retry,
}

impl TaskResult {
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: TaskState::Pending,
            result: None,
            traceback: None,
            children: Vec::new(),
        }
    }

    /// Error extraction rule (spec §4.4): `FAILURE` surfaces its traceback; otherwise
    /// an object-shaped `result.error` surfaces; otherwise no error.
    #[must_use]
    pub fn user_visible_error(&self) -> Option<String> {
        if self.status == TaskState::Failure {
            return self.traceback.clone();
        }
        self.result
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|obj| obj.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_golden_shape() {
        let envelope = build_envelope(
            IFC_PROCESSING_TASK,
            vec![Value::String("file-1".into()), Value::String("key-1".into())],
        );
        assert_eq!(envelope.content_encoding, "utf-8");
        assert_eq!(envelope.content_type, "application/json");
        assert_eq!(envelope.headers.lang, "py");
        assert_eq!(envelope.headers.task, IFC_PROCESSING_TASK);
        assert_eq!(envelope.headers.retries, 0);
        assert_eq!(envelope.headers.root_id, envelope.headers.id);
        assert_eq!(envelope.properties.delivery_mode, 2);
        assert_eq!(envelope.properties.delivery_info.routing_key, "celery");
        assert_eq!(envelope.properties.body_encoding, "base64");

        let decoded = STANDARD.decode(&envelope.body).unwrap();
        let body: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(body[0], serde_json::json!(["file-1", "key-1"]));
        assert_eq!(body[1], serde_json::json!({}));
        assert!(body[2]["callbacks"].is_null());
    }

    #[test]
    fn failure_error_prefers_traceback() {
        let result = TaskResult {
            status: TaskState::Failure,
            result: Some(serde_json::json!({"error": "ignored"})),
            traceback: Some("Traceback...".to_string()),
            children: Vec::new(),
        };
        assert_eq!(result.user_visible_error(), Some("Traceback...".to_string()));
    }

    #[test]
    fn success_with_error_in_result_surfaces_it() {
        let result = TaskResult {
            status: TaskState::Success,
            result: Some(serde_json::json!({"error": "bad geometry"})),
            traceback: None,
            children: Vec::new(),
        };
        assert_eq!(result.user_visible_error(), Some("bad geometry".to_string()));
    }

    #[test]
    fn success_without_error_is_none() {
        let result = TaskResult {
            status: TaskState::Success,
            result: Some(serde_json::json!({"building_id": "abc"})),
            traceback: None,
            children: Vec::new(),
        };
        assert_eq!(result.user_visible_error(), None);
    }
}
