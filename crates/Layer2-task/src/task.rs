//! Task identifiers and the records handed across the crate boundary

use crate::status::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a caller-supplied id; `None` when it cannot name any task
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Deterministic id for step `number` of this task
    pub fn step_id(&self, number: u32) -> Uuid {
        Uuid::new_v5(&self.0, &number.to_be_bytes())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity a worker carries from construction; the registry's reverse key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Request to create a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTask {
    /// What the worker should do
    pub task: String,

    /// Falls back to the configured default provider
    #[serde(default)]
    pub model_provider: Option<String>,

    /// Falls back to the configured default model
    #[serde(default)]
    pub model_name: Option<String>,

    /// Placeholder name to secret value
    #[serde(default)]
    pub sensitive_data: Option<HashMap<String, String>>,
}

impl CreateTask {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.model_provider = Some(provider.into());
        self.model_name = Some(model.into());
        self
    }

    pub fn with_sensitive_data(mut self, data: HashMap<String, String>) -> Self {
        self.sensitive_data = Some(data);
        self
    }
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    pub id: TaskId,
    pub live_url: Option<String>,
}

/// One row of the task list
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub task: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// One step of a worker's history, as reported in task details
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub id: Uuid,
    pub step: u32,
    pub evaluation_previous_goal: String,
    pub next_goal: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Which backend a task's worker runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BrowserData {
    Remote { session_id: String },
    Local { headless: bool },
}

/// Full view of a task
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetails {
    pub id: TaskId,
    pub task: String,
    pub status: TaskStatus,
    pub output: Option<String>,
    /// Failure message for failed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    pub live_url: Option<String>,
    pub browser_data: Option<BrowserData>,
}
