//! Task Manager - owns the task table and every lifecycle transition
//!
//! Features:
//! - Create with provisioning and a detached background unit per task
//! - Guarded stop / pause / resume with terminal-once status writes
//! - Human-in-the-loop handshake through [`HumanInputHandle`]
//! - Periodic cleanup of long-terminated records

use crate::control::Acknowledgement;
use crate::pending::{InputType, PendingRequest, PendingStore};
use crate::provision::{BrowserBackend, Provisioner};
use crate::registry::AgentRegistry;
use crate::status::TaskStatus;
use crate::task::{CreateTask, CreatedTask, StepRecord, TaskDetails, TaskId, TaskSummary};
use crate::worker::{FinalResult, StepHistory, Worker, WorkerOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pilot_foundation::{Error, LifecycleConfig, Result};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

// ============================================================================
// Task entry
// ============================================================================

#[derive(Debug)]
struct StatusCell {
    status: TaskStatus,
    /// Bumped on every committed transition
    version: u64,
    finished_at: Option<DateTime<Utc>>,
    output: Option<String>,
    error: Option<String>,
}

/// Outcome of a guarded status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Applied { from: TaskStatus, version: u64 },
    Rejected(TaskStatus),
}

struct TaskEntry {
    id: TaskId,
    task: String,
    worker: Arc<dyn Worker>,
    backend: BrowserBackend,
    live_url: Option<String>,
    created_at: DateTime<Utc>,
    cell: Mutex<StatusCell>,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Status mirror; written while `cell` is held
    registry: Arc<AgentRegistry>,
}

impl TaskEntry {
    fn new(
        id: TaskId,
        task: String,
        worker: Arc<dyn Worker>,
        backend: BrowserBackend,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            id,
            task,
            live_url: backend.live_url().map(str::to_string),
            worker,
            backend,
            created_at: Utc::now(),
            cell: Mutex::new(StatusCell {
                status: TaskStatus::Created,
                version: 0,
                finished_at: None,
                output: None,
                error: None,
            }),
            handle: Mutex::new(None),
            registry,
        }
    }

    fn status(&self) -> TaskStatus {
        self.cell.lock().status
    }

    /// Compare-and-set: commit `next` only if `guard` accepts the current
    /// status and the edge exists. The registry mirror is updated under the
    /// same lock, so it never trails a later transition.
    fn transition_if(&self, guard: impl FnOnce(TaskStatus) -> bool, next: TaskStatus) -> Transition {
        let mut cell = self.cell.lock();
        let from = cell.status;

        if !guard(from) || !from.can_transition_to(next) {
            return Transition::Rejected(from);
        }

        cell.status = next;
        cell.version += 1;
        if next.is_terminal() {
            cell.finished_at = Some(Utc::now());
        }
        self.registry.update_status(self.id, next);

        Transition::Applied {
            from,
            version: cell.version,
        }
    }

    /// Completion hook; `None` when the task was already terminal
    fn complete(&self, result: &Result<WorkerOutcome>) -> Option<TaskStatus> {
        let mut cell = self.cell.lock();
        if cell.status.is_terminal() {
            return None;
        }

        match result {
            Ok(outcome) => {
                cell.status = TaskStatus::Finished;
                cell.output = outcome.output.clone();
            }
            Err(e) => {
                cell.status = TaskStatus::Failed;
                cell.error = Some(e.to_string());
            }
        }
        cell.version += 1;
        cell.finished_at = Some(Utc::now());
        self.registry.update_status(self.id, cell.status);
        Some(cell.status)
    }

    fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        let cell = self.cell.lock();
        if !cell.status.is_terminal() {
            return false;
        }
        cell.finished_at
            .and_then(|at| (now - at).to_std().ok())
            .map(|age| age >= retention)
            .unwrap_or(false)
    }

    fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            task: self.task.clone(),
            status: self.status(),
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// Human input
// ============================================================================

/// What a worker asks a human for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanInputRequest {
    pub prompt: String,
    pub context: Option<String>,
    pub input_type: InputType,
}

impl HumanInputRequest {
    pub fn text(prompt: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: Some(context.into()),
            input_type: InputType::Text,
        }
    }
}

/// Handed back to the worker once its request is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanInputTicket {
    pub request_id: String,
    /// Text the worker feeds back into its own step loop
    pub message: String,
}

/// A worker's line back into the manager, bound to its own task id.
///
/// Holds only a weak reference, so workers never keep the manager alive.
#[derive(Clone)]
pub struct HumanInputHandle {
    task_id: TaskId,
    manager: Weak<ManagerInner>,
}

impl HumanInputHandle {
    fn new(task_id: TaskId, manager: Weak<ManagerInner>) -> Self {
        Self { task_id, manager }
    }

    /// Handle with no manager behind it; every request fails with NotFound
    pub fn detached(task_id: TaskId) -> Self {
        Self::new(task_id, Weak::new())
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Publish a pending request and move the task to `Paused`.
    ///
    /// Does not wait for the pause to be acknowledged: the caller is the
    /// worker itself and acknowledges at its next checkpoint.
    pub async fn request_input(&self, request: HumanInputRequest) -> Result<HumanInputTicket> {
        let inner = self
            .manager
            .upgrade()
            .ok_or_else(|| Error::task_not_found(self.task_id))?;

        TaskManager { inner }
            .request_human_input(self.task_id, request)
            .await
    }
}

impl std::fmt::Debug for HumanInputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanInputHandle")
            .field("task_id", &self.task_id)
            .field("attached", &(self.manager.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Task Manager
// ============================================================================

struct ManagerInner {
    config: LifecycleConfig,
    provisioner: Provisioner,
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
    registry: Arc<AgentRegistry>,
    pending: Arc<PendingStore>,
}

/// Task Manager - cheap to clone, all clones share one table
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    /// Create a new task manager
    pub fn new(config: LifecycleConfig, provisioner: Provisioner) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                provisioner,
                tasks: RwLock::new(HashMap::new()),
                registry: Arc::new(AgentRegistry::new()),
                pending: Arc::new(PendingStore::new()),
            }),
        }
    }

    pub fn registry(&self) -> Arc<AgentRegistry> {
        Arc::clone(&self.inner.registry)
    }

    async fn entry(&self, id: TaskId) -> Option<Arc<TaskEntry>> {
        self.inner.tasks.read().await.get(&id).cloned()
    }

    async fn require(&self, id: TaskId) -> Result<Arc<TaskEntry>> {
        self.entry(id).await.ok_or_else(|| Error::task_not_found(id))
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Provision a worker and start it; returns without waiting for the run
    pub async fn create(&self, request: CreateTask) -> Result<CreatedTask> {
        if request.task.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Task description must not be empty".to_string(),
            ));
        }

        let id = TaskId::new();
        let human_input = HumanInputHandle::new(id, Arc::downgrade(&self.inner));

        let provisioned = self
            .inner
            .provisioner
            .provision(id, &request, human_input, &self.inner.registry)
            .await?;

        let entry = Arc::new(TaskEntry::new(
            id,
            request.task,
            provisioned.worker,
            provisioned.backend,
            Arc::clone(&self.inner.registry),
        ));
        let live_url = entry.live_url.clone();

        self.inner.tasks.write().await.insert(id, entry.clone());

        if let Transition::Rejected(current) =
            entry.transition_if(|s| s == TaskStatus::Created, TaskStatus::Running)
        {
            // Only a stop can get here first; nothing left to start.
            info!("Task {} was {} before it started", id, current);
            return Ok(CreatedTask { id, live_url });
        }

        {
            let mut slot = entry.handle.lock();
            *slot = Some(tokio::spawn(drive(
                entry.clone(),
                Arc::clone(&self.inner.pending),
            )));
        }

        info!("Created task {}: {}", id, entry.task);
        Ok(CreatedTask { id, live_url })
    }

    // ========================================================================
    // Stop / pause / resume
    // ========================================================================

    /// Stop a task; false when unknown or already terminal
    pub async fn stop(&self, id: TaskId) -> bool {
        let Some(entry) = self.entry(id).await else {
            warn!("Task {} not found", id);
            return false;
        };

        match entry.transition_if(|s| !s.is_terminal(), TaskStatus::Stopped) {
            Transition::Rejected(current) => {
                warn!("Cannot stop task {} - current status: {}", id, current);
                return false;
            }
            Transition::Applied { from, version } => {
                debug!("Task {} {} -> stopped (v{})", id, from, version);
            }
        }

        self.inner.pending.remove(id);
        entry.worker.stop();

        let handle = entry.handle.lock().take();
        if let Some(mut handle) = handle {
            if timeout(self.inner.config.stop_grace(), &mut handle).await.is_err() {
                debug!("Task {} still running after grace period, cancelling", id);
                handle.abort();

                match timeout(self.inner.config.cancel_timeout(), handle).await {
                    Ok(Err(e)) if e.is_cancelled() => debug!("Task {} cancelled", id),
                    Ok(_) => {}
                    Err(_) => warn!(
                        "Task {} did not exit within {:?} of cancellation",
                        id,
                        self.inner.config.cancel_timeout()
                    ),
                }
            }
        }

        info!("Task {} stopped successfully", id);
        true
    }

    /// Pause a running task
    pub async fn pause(&self, id: TaskId) -> bool {
        match self.entry(id).await {
            Some(entry) => self.pause_entry(&entry, true).await,
            None => {
                warn!("Task {} not found", id);
                false
            }
        }
    }

    async fn pause_entry(&self, entry: &TaskEntry, wait_for_ack: bool) -> bool {
        let current = entry.status();
        if current != TaskStatus::Running {
            warn!("Cannot pause task {} - current status: {}", entry.id, current);
            return false;
        }

        let ack = entry.worker.pause();
        if wait_for_ack {
            self.settle(entry.id, "pause", ack).await;
        }

        match entry.transition_if(|s| s == TaskStatus::Running, TaskStatus::Paused) {
            Transition::Applied { .. } => {
                info!("Task {} paused successfully", entry.id);
                true
            }
            Transition::Rejected(now) => {
                warn!("Task {} moved to {} while pausing", entry.id, now);
                false
            }
        }
    }

    /// Resume a paused task
    pub async fn resume(&self, id: TaskId) -> bool {
        let Some(entry) = self.entry(id).await else {
            warn!("Task {} not found", id);
            return false;
        };

        let current = entry.status();
        if current != TaskStatus::Paused {
            warn!("Cannot resume task {} - current status: {}", id, current);
            return false;
        }

        let ack = entry.worker.resume();
        self.settle(id, "resume", ack).await;

        match entry.transition_if(|s| s == TaskStatus::Paused, TaskStatus::Running) {
            Transition::Applied { .. } => {
                info!("Task {} resumed successfully", id);
                true
            }
            Transition::Rejected(now) => {
                warn!("Task {} moved to {} while resuming", id, now);
                false
            }
        }
    }

    /// Wait for the worker to acknowledge, bounded by the settle timeout
    async fn settle(&self, id: TaskId, what: &str, ack: Acknowledgement) {
        let bound = self.inner.config.settle_timeout();
        match timeout(bound, ack).await {
            Ok(phase) => debug!("Task {} {} acknowledged ({:?})", id, what, phase),
            Err(_) => warn!("Task {} did not acknowledge {} within {:?}", id, what, bound),
        }
    }

    // ========================================================================
    // Human-in-the-loop
    // ========================================================================

    async fn request_human_input(
        &self,
        id: TaskId,
        request: HumanInputRequest,
    ) -> Result<HumanInputTicket> {
        let entry = self.require(id).await?;

        let status = entry.status();
        if status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "Task {} is {}, cannot wait for input",
                id, status
            )));
        }

        let pending = PendingRequest::new(request.prompt, request.context, request.input_type);
        let ticket = HumanInputTicket {
            request_id: pending.request_id.clone(),
            message: format!(
                "Waiting for human input. Request ID: {}. Prompt: {}",
                pending.request_id, pending.prompt
            ),
        };

        info!("Pausing task {} for human input: {}", id, pending.prompt);
        self.inner.pending.publish(id, pending);

        if !self.pause_entry(&entry, false).await {
            let now = entry.status();
            if now == TaskStatus::Paused {
                // Already paused by a caller; make sure the worker parks too.
                drop(entry.worker.pause());
            } else {
                self.inner.pending.remove(id);
                return Err(Error::InvalidState(format!(
                    "Task {} is {}, cannot wait for input",
                    id, now
                )));
            }
        }

        Ok(ticket)
    }

    /// Deliver feedback to a paused task. Does not resume it.
    pub async fn add_human_feedback(&self, id: TaskId, feedback: &str) -> Result<()> {
        let entry = match self.entry(id).await {
            Some(entry) => entry,
            None => {
                error!("Cannot add feedback - Task with ID {} not found", id);
                return Err(Error::task_not_found(id));
            }
        };

        let status = entry.status();
        if status != TaskStatus::Paused {
            error!("Cannot add feedback - Task {} is not paused (status: {})", id, status);
            return Err(Error::InvalidState(format!(
                "Task must be in PAUSED status to receive feedback, current status: {}",
                status
            )));
        }

        entry.worker.append_instruction(feedback)?;

        if let Some(request) = self.inner.pending.take(id) {
            info!(
                "Fulfilled human input request {} for task {}: {}",
                request.request_id, id, request.prompt
            );
        }

        debug!("Added human feedback to task {}", id);
        Ok(())
    }

    /// Feedback then resume; `Ok(false)` when the resume did not take
    pub async fn submit_feedback(&self, id: TaskId, feedback: &str) -> Result<bool> {
        self.add_human_feedback(id, feedback).await?;
        Ok(self.resume(id).await)
    }

    pub async fn pending_request(&self, id: TaskId) -> Result<Option<PendingRequest>> {
        self.require(id).await?;
        Ok(self.inner.pending.get(id))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_status(&self, id: TaskId) -> Result<TaskStatus> {
        Ok(self.require(id).await?.status())
    }

    /// Full details; diagnostic data the worker cannot provide is omitted
    pub async fn get_details(&self, id: TaskId) -> Result<TaskDetails> {
        let entry = self.require(id).await?;

        let (status, finished_at, stored_output, error) = {
            let cell = entry.cell.lock();
            (
                cell.status,
                cell.finished_at,
                cell.output.clone(),
                cell.error.clone(),
            )
        };

        let steps = match catch_unwind(AssertUnwindSafe(|| entry.worker.history())) {
            Ok(StepHistory::Known(steps)) => steps
                .into_iter()
                .map(|step| StepRecord {
                    id: id.step_id(step.number),
                    step: step.number,
                    evaluation_previous_goal: step.evaluation_previous_goal,
                    next_goal: step.next_goal,
                    actions: step.actions,
                    url: step.url,
                })
                .collect(),
            Ok(StepHistory::Unknown) => Vec::new(),
            Err(_) => {
                error!("Error getting step details for task {}", id);
                Vec::new()
            }
        };

        let output = if status == TaskStatus::Finished {
            match catch_unwind(AssertUnwindSafe(|| entry.worker.final_result())) {
                Ok(FinalResult::Known(Some(result))) => Some(result),
                Ok(_) => stored_output,
                Err(_) => {
                    error!("Error getting output for task {}", id);
                    stored_output
                }
            }
        } else {
            None
        };

        Ok(TaskDetails {
            id,
            task: entry.task.clone(),
            status,
            output,
            error,
            created_at: entry.created_at,
            finished_at,
            steps,
            live_url: entry.live_url.clone(),
            browser_data: Some(entry.backend.browser_data()),
        })
    }

    /// All tasks, oldest first
    pub async fn list(&self) -> Vec<TaskSummary> {
        let mut tasks: Vec<TaskSummary> = self
            .inner
            .tasks
            .read()
            .await
            .values()
            .map(|entry| entry.summary())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub async fn len(&self) -> usize {
        self.inner.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // ========================================================================
    // Resource cleanup
    // ========================================================================

    /// Drop records that have been terminal for at least `retention`
    pub async fn cleanup_older_than(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let removed: Vec<TaskId> = {
            let mut tasks = self.inner.tasks.write().await;
            let expired: Vec<TaskId> = tasks
                .iter()
                .filter(|(_, entry)| entry.is_expired(retention, now))
                .map(|(id, _)| *id)
                .collect();
            for id in &expired {
                tasks.remove(id);
            }
            expired
        };

        for id in &removed {
            self.inner.registry.unregister(*id);
            self.inner.pending.remove(*id);
        }

        if !removed.is_empty() {
            info!("Cleaned up {} finished tasks", removed.len());
        }
        removed.len()
    }

    /// Run [`Self::cleanup_older_than`] every `interval` until the manager is dropped
    pub fn start_periodic_cleanup(&self, interval: Duration, retention: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(&self.inner);
        let interval = interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = manager.upgrade() else {
                    debug!("Task manager dropped, stopping cleanup loop");
                    break;
                };
                TaskManager { inner }.cleanup_older_than(retention).await;
            }
        })
    }

    /// Stop every task that is still live; returns how many were stopped
    pub async fn shutdown(&self) -> usize {
        let live: Vec<TaskId> = self
            .inner
            .tasks
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.status().is_terminal())
            .map(|(id, _)| *id)
            .collect();

        if live.is_empty() {
            return 0;
        }

        info!("Stopping {} live tasks", live.len());
        let results = futures::future::join_all(live.into_iter().map(|id| self.stop(id))).await;
        results.into_iter().filter(|stopped| *stopped).count()
    }
}

/// Background unit: drive the worker, then record how it ended.
///
/// A worker that ends while its human-input request is unanswered takes
/// the request with it.
async fn drive(entry: Arc<TaskEntry>, pending: Arc<PendingStore>) {
    let result = entry.worker.run().await;

    if let Err(e) = &result {
        error!("Error in agent task {}: {}", entry.id, e);
    }

    match entry.complete(&result) {
        Some(status) => {
            if let Some(request) = pending.take(entry.id) {
                warn!(
                    "Task {} {} with human input request {} unanswered",
                    entry.id, status, request.request_id
                );
            }
            info!("Task {} {}", entry.id, status);
        }
        None => debug!(
            "Task {} already {}, discarding completion signal",
            entry.id,
            entry.status()
        ),
    }
}
