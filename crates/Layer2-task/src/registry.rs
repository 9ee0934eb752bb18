//! Agent registry
//!
//! Secondary index over live workers: task id to worker (plus a mirror of the
//! task's status) and worker id back to task id. The task manager owns the
//! authoritative status; this is a derived view kept in step with it.

use crate::status::TaskStatus;
use crate::task::{TaskId, WorkerId};
use crate::worker::Worker;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct Registration {
    worker: Arc<dyn Worker>,
    status: TaskStatus,
}

#[derive(Default)]
struct RegistryState {
    forward: HashMap<TaskId, Registration>,
    reverse: HashMap<WorkerId, TaskId>,
    current: Option<TaskId>,
}

/// Bidirectional worker index; both maps sit behind one lock
#[derive(Default)]
pub struct AgentRegistry {
    state: RwLock<RegistryState>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker` for `task_id`, replacing any previous worker
    pub fn register(&self, worker: Arc<dyn Worker>, task_id: TaskId) {
        let worker_id = worker.id();
        let mut state = self.state.write();

        let previous = state.forward.insert(
            task_id,
            Registration {
                worker,
                status: TaskStatus::Created,
            },
        );
        if let Some(previous) = previous {
            let old_id = previous.worker.id();
            if old_id != worker_id {
                state.reverse.remove(&old_id);
                warn!("Replaced worker {} for task {}", old_id, task_id);
            }
        }

        state.reverse.insert(worker_id, task_id);
        state.current = Some(task_id);
        debug!("Registered worker {} for task {}", worker_id, task_id);
    }

    /// Most recently registered worker.
    ///
    /// Not safe to use for attributing callbacks when several tasks run at
    /// once; workers carry their own task id for that.
    pub fn current_agent(&self) -> Option<Arc<dyn Worker>> {
        let state = self.state.read();
        let task_id = state.current?;
        state.forward.get(&task_id).map(|r| r.worker.clone())
    }

    pub fn agent_for_task(&self, task_id: TaskId) -> Option<Arc<dyn Worker>> {
        self.state
            .read()
            .forward
            .get(&task_id)
            .map(|r| r.worker.clone())
    }

    pub fn task_id_for_worker(&self, worker_id: WorkerId) -> Option<TaskId> {
        self.state.read().reverse.get(&worker_id).copied()
    }

    /// Mirror a status change; false when the task is not registered
    pub fn update_status(&self, task_id: TaskId, status: TaskStatus) -> bool {
        match self.state.write().forward.get_mut(&task_id) {
            Some(registration) => {
                registration.status = status;
                true
            }
            None => false,
        }
    }

    pub fn status_of(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.state.read().forward.get(&task_id).map(|r| r.status)
    }

    /// Remove both entries for a task; returns the worker that was registered
    pub fn unregister(&self, task_id: TaskId) -> Option<Arc<dyn Worker>> {
        let mut state = self.state.write();
        let registration = state.forward.remove(&task_id)?;

        state.reverse.remove(&registration.worker.id());
        if state.current == Some(task_id) {
            state.current = None;
        }

        debug!("Unregistered worker for task {}", task_id);
        Some(registration.worker)
    }

    pub fn len(&self) -> usize {
        self.state.read().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
