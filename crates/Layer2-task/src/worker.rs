//! Worker contract
//!
//! Everything the task manager needs from the long-running unit that drives
//! a task. The manager never reaches past this trait.

use crate::control::Acknowledgement;
use crate::task::{TaskId, WorkerId};
use async_trait::async_trait;
use pilot_foundation::Result;
use serde::{Deserialize, Serialize};

/// What a worker returns when its run completes normally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Final answer, if the worker produced one
    pub output: Option<String>,
}

impl WorkerOutcome {
    pub fn with_output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
        }
    }
}

/// One completed step of a worker's loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based
    pub number: u32,
    pub evaluation_previous_goal: String,
    pub next_goal: String,
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Step history, when the backend can report one
#[derive(Debug, Clone, PartialEq)]
pub enum StepHistory {
    Known(Vec<Step>),
    Unknown,
}

/// Final result, when the backend can report one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalResult {
    /// `None` while the worker has not declared itself done
    Known(Option<String>),
    Unknown,
}

/// A long-running unit that drives one task
#[async_trait]
pub trait Worker: Send + Sync {
    /// Identity assigned at construction
    fn id(&self) -> WorkerId;

    /// Task this worker was built for
    fn task_id(&self) -> TaskId;

    /// Task description
    fn current_task(&self) -> String;

    /// Drive the task to completion
    async fn run(&self) -> Result<WorkerOutcome>;

    /// Cooperative pause; the acknowledgment resolves once observed
    fn pause(&self) -> Acknowledgement;

    /// Cooperative resume
    fn resume(&self) -> Acknowledgement;

    /// Cooperative stop, fire-and-forget
    fn stop(&self);

    /// Add an instruction the worker picks up at its next step
    fn append_instruction(&self, text: &str) -> Result<()>;

    fn history(&self) -> StepHistory {
        StepHistory::Unknown
    }

    fn final_result(&self) -> FinalResult {
        FinalResult::Unknown
    }
}
