//! # pilot-task
//!
//! Task lifecycle management for Pilot.
//! Tracks every in-flight task, enforces the status state machine under
//! concurrent access and coordinates cooperative signaling with workers.
//!
//! ## Features
//!
//! - Task manager with terminal-once status transitions
//! - Acknowledged pause / resume and bounded stop
//! - Human-in-the-loop handshake with pending requests
//! - Agent registry with O(1) lookup in both directions
//! - Remote browser provisioning with local fallback

pub mod control;
pub mod manager;
pub mod pending;
pub mod provision;
pub mod registry;
pub mod status;
pub mod task;
pub mod worker;

// Task system
pub use manager::{HumanInputHandle, HumanInputRequest, HumanInputTicket, TaskManager};
pub use status::TaskStatus;
pub use task::{
    BrowserData, CreateTask, CreatedTask, StepRecord, TaskDetails, TaskId, TaskSummary, WorkerId,
};

// Workers
pub use control::{Acknowledgement, Stopped, WorkerControl, WorkerPhase};
pub use worker::{FinalResult, Step, StepHistory, Worker, WorkerOutcome};

// Registry and pending requests
pub use pending::{InputType, PendingRequest, PendingStore};
pub use registry::AgentRegistry;

// Provisioning
pub use provision::{
    AnchorSessionClient, BrowserBackend, LocalBrowser, Provisioned, Provisioner, RemoteSession,
    RemoteSessionClient, WorkerFactory, WorkerSpec,
};
