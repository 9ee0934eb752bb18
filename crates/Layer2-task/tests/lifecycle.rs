//! Lifecycle tests driven by scripted workers

use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_foundation::{Error, LifecycleConfig, Result};
use pilot_task::{
    Acknowledgement, AgentRegistry, BrowserBackend, BrowserData, CreateTask, HumanInputHandle,
    HumanInputRequest, Provisioner, RemoteSession, RemoteSessionClient, Step, StepHistory,
    TaskId, TaskManager, TaskStatus, Worker, WorkerControl, WorkerFactory, WorkerId, WorkerOutcome,
    WorkerSpec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Scripted worker
// ============================================================================

#[derive(Clone, Default)]
struct Script {
    steps: u32,
    step_delay: Duration,
    /// Ask a human for input during this step
    ask_at: Option<u32>,
    fail: bool,
}

struct ScriptedWorker {
    id: WorkerId,
    task_id: TaskId,
    task: String,
    script: Script,
    control: WorkerControl,
    human_input: HumanInputHandle,
    steps: Mutex<Vec<Step>>,
    heard: Mutex<Vec<String>>,
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn task_id(&self) -> TaskId {
        self.task_id
    }

    fn current_task(&self) -> String {
        self.task.clone()
    }

    async fn run(&self) -> Result<WorkerOutcome> {
        for number in 1..=self.script.steps {
            if self.control.checkpoint().await.is_err() {
                return Err(Error::Cancelled);
            }
            self.heard.lock().extend(self.control.take_instructions());

            tokio::select! {
                _ = tokio::time::sleep(self.script.step_delay) => {}
                _ = self.control.stopped() => return Err(Error::Cancelled),
            }

            let mut next_goal = format!("step {}", number);
            if self.script.ask_at == Some(number) {
                let ticket = self
                    .human_input
                    .request_input(HumanInputRequest::text(
                        "Please provide a value for this form field: email",
                        "The agent needs input for a form field: email",
                    ))
                    .await?;
                next_goal = ticket.message;
            }

            self.steps.lock().push(Step {
                number,
                evaluation_previous_goal: "Success".into(),
                next_goal,
                actions: vec![],
                url: Some("https://example.com".into()),
            });
        }

        if self.control.checkpoint().await.is_err() {
            return Err(Error::Cancelled);
        }
        self.heard.lock().extend(self.control.take_instructions());
        self.control.mark_finished();

        if self.script.fail {
            return Err(Error::Worker("scripted failure".into()));
        }

        let heard = self.heard.lock().join("; ");
        Ok(WorkerOutcome::with_output(format!("done [{}]", heard)))
    }

    fn pause(&self) -> Acknowledgement {
        self.control.request_pause()
    }

    fn resume(&self) -> Acknowledgement {
        self.control.request_resume()
    }

    fn stop(&self) {
        self.control.request_stop();
    }

    fn append_instruction(&self, text: &str) -> Result<()> {
        self.control.push_instruction(text);
        Ok(())
    }

    fn history(&self) -> StepHistory {
        StepHistory::Known(self.steps.lock().clone())
    }
}

/// Never reaches a checkpoint, so it neither acknowledges nor exits
struct StubbornWorker {
    id: WorkerId,
    task_id: TaskId,
    control: WorkerControl,
}

#[async_trait]
impl Worker for StubbornWorker {
    fn id(&self) -> WorkerId {
        self.id
    }
    fn task_id(&self) -> TaskId {
        self.task_id
    }
    fn current_task(&self) -> String {
        "stubborn".into()
    }
    async fn run(&self) -> Result<WorkerOutcome> {
        futures::future::pending::<()>().await;
        Ok(WorkerOutcome::default())
    }
    fn pause(&self) -> Acknowledgement {
        self.control.request_pause()
    }
    fn resume(&self) -> Acknowledgement {
        self.control.request_resume()
    }
    fn stop(&self) {
        self.control.request_stop();
    }
    fn append_instruction(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

enum Kind {
    Scripted(Script),
    Stubborn,
    Broken,
}

struct TestFactory {
    kind: Kind,
    built: AtomicUsize,
}

impl TestFactory {
    fn scripted(script: Script) -> Arc<Self> {
        Arc::new(Self {
            kind: Kind::Scripted(script),
            built: AtomicUsize::new(0),
        })
    }

    fn stubborn() -> Arc<Self> {
        Arc::new(Self {
            kind: Kind::Stubborn,
            built: AtomicUsize::new(0),
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            kind: Kind::Broken,
            built: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WorkerFactory for TestFactory {
    async fn build(&self, spec: WorkerSpec) -> Result<Arc<dyn Worker>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        match &self.kind {
            Kind::Scripted(script) => Ok(Arc::new(ScriptedWorker {
                id: WorkerId::new(),
                task_id: spec.task_id,
                task: spec.task,
                script: script.clone(),
                control: WorkerControl::new(),
                human_input: spec.human_input,
                steps: Mutex::new(Vec::new()),
                heard: Mutex::new(Vec::new()),
            })),
            Kind::Stubborn => Ok(Arc::new(StubbornWorker {
                id: WorkerId::new(),
                task_id: spec.task_id,
                control: WorkerControl::new(),
            })),
            Kind::Broken => Err(Error::Provider("Unsupported model provider: nope".into())),
        }
    }
}

struct FixedRemote(Option<RemoteSession>);

#[async_trait]
impl RemoteSessionClient for FixedRemote {
    async fn create_session(&self) -> Result<RemoteSession> {
        self.0
            .clone()
            .ok_or_else(|| Error::Provisioning("connection refused".into()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> LifecycleConfig {
    LifecycleConfig {
        stop_grace_ms: 50,
        cancel_timeout_ms: 200,
        settle_timeout_ms: 500,
        ..LifecycleConfig::default()
    }
}

fn manager_with(factory: Arc<TestFactory>) -> TaskManager {
    TaskManager::new(fast_config(), Provisioner::new(factory))
}

fn slow_script(steps: u32) -> Script {
    Script {
        steps,
        step_delay: Duration::from_millis(20),
        ..Script::default()
    }
}

async fn wait_for(manager: &TaskManager, id: TaskId, want: TaskStatus) -> TaskStatus {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = manager.get_status(id).await.unwrap();
        if status == want || Instant::now() > deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Create / query
// ============================================================================

#[tokio::test]
async fn create_returns_before_completion() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 1,
        step_delay: Duration::from_secs(30),
        ..Script::default()
    }));

    let started = Instant::now();
    let created = manager.create(CreateTask::new("open example.com")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Running);
    assert!(manager.stop(created.id).await);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let manager = manager_with(TestFactory::scripted(slow_script(1)));
    let ghost = TaskId::new();

    assert!(matches!(manager.get_status(ghost).await, Err(Error::NotFound(_))));
    assert!(matches!(manager.get_details(ghost).await, Err(Error::NotFound(_))));
    assert!(matches!(manager.pending_request(ghost).await, Err(Error::NotFound(_))));
    assert!(matches!(
        manager.add_human_feedback(ghost, "hi").await,
        Err(Error::NotFound(_))
    ));
    assert!(!manager.stop(ghost).await);
    assert!(!manager.pause(ghost).await);
    assert!(!manager.resume(ghost).await);
}

#[tokio::test]
async fn finished_task_reports_output_and_steps() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 3,
        step_delay: Duration::from_millis(1),
        ..Script::default()
    }));
    let created = manager.create(CreateTask::new("count to three")).await.unwrap();

    assert_eq!(
        wait_for(&manager, created.id, TaskStatus::Finished).await,
        TaskStatus::Finished
    );

    let first = manager.get_details(created.id).await.unwrap();
    let second = manager.get_details(created.id).await.unwrap();
    assert_eq!(first.steps.len(), 3);
    assert_eq!(first.output.as_deref(), Some("done []"));
    assert_eq!(first.browser_data, Some(BrowserData::Local { headless: true }));
    assert!(first.finished_at.unwrap() >= first.created_at);

    let ids: Vec<_> = first.steps.iter().map(|s| s.id).collect();
    let again: Vec<_> = second.steps.iter().map(|s| s.id).collect();
    assert_eq!(ids, again);

    assert!(!manager.stop(created.id).await);
    assert!(!manager.pause(created.id).await);
}

#[tokio::test]
async fn worker_error_fails_task() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 1,
        fail: true,
        ..Script::default()
    }));
    let created = manager.create(CreateTask::new("doomed")).await.unwrap();

    assert_eq!(
        wait_for(&manager, created.id, TaskStatus::Failed).await,
        TaskStatus::Failed
    );
    let details = manager.get_details(created.id).await.unwrap();
    assert!(details.output.is_none());
    assert!(details.error.unwrap().contains("scripted failure"));
}

// ============================================================================
// Pause / resume / stop
// ============================================================================

#[tokio::test]
async fn pause_then_resume_round_trip() {
    let manager = manager_with(TestFactory::scripted(slow_script(20)));
    let created = manager.create(CreateTask::new("long")).await.unwrap();

    assert!(manager.pause(created.id).await);
    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Paused);
    assert_eq!(
        manager.registry().status_of(created.id),
        Some(TaskStatus::Paused)
    );
    assert!(!manager.pause(created.id).await);

    assert!(manager.resume(created.id).await);
    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Running);
    assert!(!manager.resume(created.id).await);

    assert!(manager.stop(created.id).await);
}

#[tokio::test]
async fn pause_is_acknowledged_by_worker() {
    let manager = manager_with(TestFactory::scripted(slow_script(50)));
    let created = manager.create(CreateTask::new("long")).await.unwrap();
    assert!(manager.pause(created.id).await);

    let worker = manager.registry().agent_for_task(created.id).unwrap();
    let steps_at_pause = match worker.history() {
        StepHistory::Known(steps) => steps.len(),
        StepHistory::Unknown => unreachable!(),
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let steps_later = match worker.history() {
        StepHistory::Known(steps) => steps.len(),
        StepHistory::Unknown => unreachable!(),
    };
    assert_eq!(steps_at_pause, steps_later, "worker kept stepping while paused");

    assert!(manager.stop(created.id).await);
}

#[tokio::test]
async fn concurrent_pauses_only_one_wins() {
    let manager = manager_with(TestFactory::scripted(slow_script(50)));
    let created = manager.create(CreateTask::new("long")).await.unwrap();

    let (a, b) = tokio::join!(manager.pause(created.id), manager.pause(created.id));
    assert!(a ^ b);
    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Paused);

    manager.stop(created.id).await;
}

#[tokio::test]
async fn stop_immediately_then_stop_again() {
    let manager = manager_with(TestFactory::scripted(slow_script(50)));
    let created = manager.create(CreateTask::new("long")).await.unwrap();

    let started = Instant::now();
    assert!(manager.stop(created.id).await);
    assert!(started.elapsed() < Duration::from_millis(50 + 200 + 200));
    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Stopped);

    assert!(!manager.stop(created.id).await);
    assert!(!manager.resume(created.id).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Stopped);
}

#[tokio::test]
async fn stop_aborts_worker_that_ignores_signals() {
    let manager = manager_with(TestFactory::stubborn());
    let created = manager.create(CreateTask::new("ignore me")).await.unwrap();

    let started = Instant::now();
    assert!(manager.stop(created.id).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Stopped);
}

#[tokio::test]
async fn unacknowledged_pause_still_pauses() {
    let manager = manager_with(TestFactory::stubborn());
    let created = manager.create(CreateTask::new("deaf")).await.unwrap();

    let started = Instant::now();
    assert!(manager.pause(created.id).await);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(manager.get_status(created.id).await.unwrap(), TaskStatus::Paused);

    assert!(manager.stop(created.id).await);
}

#[tokio::test]
async fn stop_racing_completion_is_terminal_once() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 1,
        step_delay: Duration::from_millis(2),
        ..Script::default()
    }));

    for _ in 0..30 {
        let created = manager.create(CreateTask::new("race")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        let stopped = manager.stop(created.id).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = manager.get_status(created.id).await.unwrap();

        if stopped {
            assert_eq!(status, TaskStatus::Stopped);
        } else {
            assert_eq!(status, TaskStatus::Finished);
        }
    }
}

// ============================================================================
// Human-in-the-loop
// ============================================================================

#[tokio::test]
async fn human_input_handshake_end_to_end() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 3,
        step_delay: Duration::from_millis(5),
        ask_at: Some(2),
        ..Script::default()
    }));
    let created = manager.create(CreateTask::new("open example.com")).await.unwrap();

    assert_eq!(
        wait_for(&manager, created.id, TaskStatus::Paused).await,
        TaskStatus::Paused
    );
    let pending = manager.pending_request(created.id).await.unwrap().unwrap();
    assert!(!pending.prompt.is_empty());
    assert_eq!(
        manager.registry().status_of(created.id),
        Some(TaskStatus::Paused)
    );

    // the step that asked is recorded right after the handshake returns
    tokio::time::sleep(Duration::from_millis(20)).await;
    let details = manager.get_details(created.id).await.unwrap();
    let last = details.steps.last().unwrap();
    assert!(last.next_goal.starts_with("Waiting for human input. Request ID: "));
    assert!(last.next_goal.contains(&pending.request_id));

    assert!(manager
        .submit_feedback(created.id, "click the button")
        .await
        .unwrap());
    assert!(manager.pending_request(created.id).await.unwrap().is_none());

    assert_eq!(
        wait_for(&manager, created.id, TaskStatus::Finished).await,
        TaskStatus::Finished
    );
    let details = manager.get_details(created.id).await.unwrap();
    assert_eq!(details.output.as_deref(), Some("done [click the button]"));
}

#[tokio::test]
async fn feedback_requires_paused() {
    let manager = manager_with(TestFactory::scripted(slow_script(50)));
    let created = manager.create(CreateTask::new("long")).await.unwrap();

    let err = manager
        .add_human_feedback(created.id, "too early")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    manager.stop(created.id).await;
    let err = manager.submit_feedback(created.id, "too late").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn resume_without_feedback_keeps_pending_request() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 30,
        step_delay: Duration::from_millis(5),
        ask_at: Some(1),
        ..Script::default()
    }));
    let created = manager.create(CreateTask::new("ask first")).await.unwrap();
    wait_for(&manager, created.id, TaskStatus::Paused).await;

    assert!(manager.resume(created.id).await);
    assert!(manager.pending_request(created.id).await.unwrap().is_some());

    assert!(manager.stop(created.id).await);
    assert!(manager.pending_request(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn handshakes_resolve_to_their_own_tasks() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 5,
        step_delay: Duration::from_millis(5),
        ask_at: Some(2),
        ..Script::default()
    }));

    let a = manager.create(CreateTask::new("a")).await.unwrap();
    let b = manager.create(CreateTask::new("b")).await.unwrap();

    assert_eq!(wait_for(&manager, a.id, TaskStatus::Paused).await, TaskStatus::Paused);
    assert_eq!(wait_for(&manager, b.id, TaskStatus::Paused).await, TaskStatus::Paused);

    let pa = manager.pending_request(a.id).await.unwrap().unwrap();
    let pb = manager.pending_request(b.id).await.unwrap().unwrap();
    assert_ne!(pa.request_id, pb.request_id);

    manager.shutdown().await;
}

// ============================================================================
// Provisioning
// ============================================================================

#[tokio::test]
async fn remote_failure_falls_back_to_local() {
    let provisioner =
        Provisioner::new(TestFactory::scripted(slow_script(50))).with_remote(Arc::new(FixedRemote(None)));
    let manager = TaskManager::new(fast_config(), provisioner);

    let created = manager.create(CreateTask::new("fallback")).await.unwrap();
    assert!(created.live_url.is_none());

    let details = manager.get_details(created.id).await.unwrap();
    assert!(matches!(details.browser_data, Some(BrowserData::Local { .. })));
    manager.stop(created.id).await;
}

#[tokio::test]
async fn remote_session_provides_live_url() {
    let session = RemoteSession {
        session_id: "sess-1".into(),
        cdp_url: "wss://cdp.example".into(),
        live_view_url: Some("https://live.example/sess-1".into()),
    };
    let provisioner = Provisioner::new(TestFactory::scripted(slow_script(50)))
        .with_remote(Arc::new(FixedRemote(Some(session))));
    let manager = TaskManager::new(fast_config(), provisioner);

    let created = manager.create(CreateTask::new("remote")).await.unwrap();
    assert_eq!(created.live_url.as_deref(), Some("https://live.example/sess-1"));

    let details = manager.get_details(created.id).await.unwrap();
    assert_eq!(
        details.browser_data,
        Some(BrowserData::Remote {
            session_id: "sess-1".into()
        })
    );
    manager.stop(created.id).await;
}

#[tokio::test]
async fn factory_failure_registers_nothing() {
    let manager = manager_with(TestFactory::broken());

    let err = manager.create(CreateTask::new("x")).await.unwrap_err();
    assert!(matches!(err, Error::Provider(_)));
    assert!(manager.registry().is_empty());
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn provisioned_worker_is_registered_before_it_runs() {
    let factory = TestFactory::scripted(slow_script(50));
    let registry = AgentRegistry::new();
    let provisioner = Provisioner::new(factory.clone());

    let task_id = TaskId::new();
    let provisioned = provisioner
        .provision(
            task_id,
            &CreateTask::new("register me").with_model("scripted", "m"),
            HumanInputHandle::detached(task_id),
            &registry,
        )
        .await
        .unwrap();

    assert!(matches!(provisioned.backend, BrowserBackend::Local(_)));
    assert_eq!(
        registry.task_id_for_worker(provisioned.worker.id()),
        Some(task_id)
    );
    assert_eq!(factory.built.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Cleanup / shutdown
// ============================================================================

#[tokio::test]
async fn cleanup_removes_terminal_records() {
    let manager = manager_with(TestFactory::scripted(slow_script(50)));
    let done = manager.create(CreateTask::new("done")).await.unwrap();
    let live = manager.create(CreateTask::new("live")).await.unwrap();
    manager.stop(done.id).await;

    assert_eq!(manager.cleanup_older_than(Duration::from_secs(3600)).await, 0);
    assert_eq!(manager.cleanup_older_than(Duration::ZERO).await, 1);

    assert!(matches!(manager.get_status(done.id).await, Err(Error::NotFound(_))));
    assert!(manager.registry().agent_for_task(done.id).is_none());
    assert_eq!(manager.list().await.len(), 1);
    assert_eq!(manager.list().await[0].id, live.id);

    manager.stop(live.id).await;
}

#[tokio::test]
async fn periodic_cleanup_runs() {
    let manager = manager_with(TestFactory::scripted(slow_script(50)));
    let created = manager.create(CreateTask::new("short lived")).await.unwrap();
    manager.stop(created.id).await;

    let cleaner = manager.start_periodic_cleanup(Duration::from_millis(20), Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.is_empty().await);
    cleaner.abort();
}

#[tokio::test]
async fn shutdown_stops_every_live_task() {
    let manager = manager_with(TestFactory::scripted(slow_script(50)));
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(manager.create(CreateTask::new(format!("t{i}"))).await.unwrap().id);
    }
    manager.pause(ids[0]).await;

    assert_eq!(manager.shutdown().await, 4);
    for id in ids {
        assert_eq!(manager.get_status(id).await.unwrap(), TaskStatus::Stopped);
    }
    assert_eq!(manager.shutdown().await, 0);
}

#[tokio::test]
async fn statuses_never_leave_the_graph() {
    let manager = manager_with(TestFactory::scripted(Script {
        steps: 6,
        step_delay: Duration::from_millis(3),
        ask_at: Some(3),
        ..Script::default()
    }));
    let created = manager.create(CreateTask::new("observe")).await.unwrap();

    let observer = {
        let manager = manager.clone();
        let id = created.id;
        tokio::spawn(async move {
            let mut seen = vec![TaskStatus::Running];
            for _ in 0..400 {
                let status = manager.get_status(id).await.unwrap();
                if status != *seen.last().unwrap() {
                    seen.push(status);
                }
                if status.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            seen
        })
    };

    wait_for(&manager, created.id, TaskStatus::Paused).await;
    manager.submit_feedback(created.id, "go on").await.unwrap();

    let seen = observer.await.unwrap();
    for pair in seen.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "illegal transition {} -> {}",
            pair[0],
            pair[1]
        );
    }
    assert_eq!(seen.last(), Some(&TaskStatus::Finished));
}
