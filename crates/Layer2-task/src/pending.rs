//! Pending human-input requests, at most one per task

use crate::task::TaskId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hint for how the caller should collect the answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    Text,
    Choice,
    Confirmation,
}

/// An outstanding request for human input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request_id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub input_type: InputType,
    pub created_at: DateTime<Utc>,
}

impl PendingRequest {
    pub fn new(prompt: impl Into<String>, context: Option<String>, input_type: InputType) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            context,
            input_type,
            created_at: Utc::now(),
        }
    }
}

/// Store of pending requests keyed by task
#[derive(Default)]
pub struct PendingStore {
    requests: Mutex<HashMap<TaskId, PendingRequest>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a request; replaces (and logs) any request already outstanding
    pub fn publish(&self, task_id: TaskId, request: PendingRequest) {
        let request_id = request.request_id.clone();
        if let Some(old) = self.requests.lock().insert(task_id, request) {
            warn!(
                "Task {} replaced pending request {} with {}",
                task_id, old.request_id, request_id
            );
        } else {
            debug!("Task {} waiting on request {}", task_id, request_id);
        }
    }

    pub fn get(&self, task_id: TaskId) -> Option<PendingRequest> {
        self.requests.lock().get(&task_id).cloned()
    }

    /// Remove and return; used when feedback is delivered
    pub fn take(&self, task_id: TaskId) -> Option<PendingRequest> {
        self.requests.lock().remove(&task_id)
    }

    pub fn remove(&self, task_id: TaskId) {
        self.requests.lock().remove(&task_id);
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.requests.lock().contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_most_one_per_task() {
        let store = PendingStore::new();
        let task_id = TaskId::new();

        store.publish(task_id, PendingRequest::new("first", None, InputType::Text));
        store.publish(
            task_id,
            PendingRequest::new("second", Some("why".into()), InputType::Confirmation),
        );

        assert_eq!(store.len(), 1);
        let current = store.get(task_id).unwrap();
        assert_eq!(current.prompt, "second");
        assert_eq!(current.input_type, InputType::Confirmation);
    }

    #[test]
    fn test_take_removes() {
        let store = PendingStore::new();
        let task_id = TaskId::new();
        store.publish(task_id, PendingRequest::new("captcha", None, InputType::Text));

        assert!(store.contains(task_id));
        assert_eq!(store.take(task_id).unwrap().prompt, "captcha");
        assert!(store.take(task_id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_request_ids_unique() {
        let a = PendingRequest::new("p", None, InputType::Text);
        let b = PendingRequest::new("p", None, InputType::Text);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_serialized_shape() {
        let req = PendingRequest::new("Value for email", None, InputType::Choice);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["input_type"], "choice");
        assert!(json.get("context").is_none());
    }
}
