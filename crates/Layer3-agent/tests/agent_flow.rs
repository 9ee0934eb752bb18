//! Agents driven through the task manager with scripted model responses

use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_agent::{AgentSettings, AgentWorkerFactory, BrowserSession, PageState};
use pilot_foundation::{LifecycleConfig, Result};
use pilot_provider::{Provider, ProviderFactory, ScriptedProvider};
use pilot_task::{CreateTask, Provisioner, TaskId, TaskManager, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct RecordingBrowser {
    visited: Mutex<Vec<String>>,
    page: Mutex<Option<PageState>>,
}

#[async_trait]
impl BrowserSession for RecordingBrowser {
    async fn navigate(&self, url: &str) -> Result<PageState> {
        self.visited.lock().push(url.to_string());
        let page = PageState {
            url: url.to_string(),
            title: "Example Domain".to_string(),
            text: "This domain is for use in examples.".to_string(),
        };
        *self.page.lock() = Some(page.clone());
        Ok(page)
    }

    fn current_page(&self) -> Option<PageState> {
        self.page.lock().clone()
    }
}

struct Harness {
    manager: TaskManager,
    provider: Arc<ScriptedProvider>,
    browser: Arc<RecordingBrowser>,
}

fn harness(provider: ScriptedProvider) -> Harness {
    harness_with(provider, AgentSettings::default())
}

fn harness_with(provider: ScriptedProvider, settings: AgentSettings) -> Harness {
    let provider = Arc::new(provider);
    let browser = Arc::new(RecordingBrowser::default());

    let mut providers = ProviderFactory::new();
    providers.register_instance("scripted", provider.clone() as Arc<dyn Provider>);

    let launched = browser.clone();
    let factory = AgentWorkerFactory::new(Arc::new(providers)).with_browser_launcher(Arc::new(
        move |_| Ok(launched.clone() as Arc<dyn BrowserSession>),
    )).with_settings(settings);

    let config = LifecycleConfig {
        stop_grace_ms: 50,
        cancel_timeout_ms: 200,
        settle_timeout_ms: 500,
        ..LifecycleConfig::default()
    };
    let provisioner = Provisioner::new(Arc::new(factory)).with_default_model("scripted", "test");

    Harness {
        manager: TaskManager::new(config, provisioner),
        provider,
        browser,
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

const NAVIGATE: &str = r#"{"current_state":{"evaluation_previous_goal":"Unknown","next_goal":"Open the site"},"action":[{"go_to_url":{"url":"https://example.com"}}]}"#;
const DONE: &str = r#"{"current_state":{"evaluation_previous_goal":"Success","next_goal":"Report"},"action":[{"done":{"text":"The page says Example Domain"}}]}"#;
const ASK: &str = r#"{"current_state":{"evaluation_previous_goal":"Failed - captcha","next_goal":"Ask for help"},"action":[{"ask_human":{"question":"Select all buses"}},{"go_to_url":{"url":"https://never.example"}}]}"#;

#[tokio::test]
async fn navigates_then_finishes() {
    let h = harness(ScriptedProvider::new("test", [NAVIGATE, DONE]));
    let created = h.manager.create(CreateTask::new("What does example.com say?")).await.unwrap();

    assert_eq!(
        wait_for(&h.manager, created.id, TaskStatus::Finished).await,
        TaskStatus::Finished
    );

    let details = h.manager.get_details(created.id).await.unwrap();
    assert_eq!(details.output.as_deref(), Some("The page says Example Domain"));
    assert_eq!(details.steps.len(), 2);
    assert_eq!(details.steps[0].next_goal, "Open the site");
    assert_eq!(details.steps[0].url.as_deref(), Some("https://example.com"));
    assert_eq!(details.steps[1].evaluation_previous_goal, "Success");
    assert_eq!(h.browser.visited.lock().as_slice(), ["https://example.com"]);

    let second_call = &h.provider.transcript()[1];
    let state = &second_call.last().unwrap().content;
    assert!(state.contains("Current url: https://example.com"));
    assert!(state.contains("Action result (go_to_url)"));
}

#[tokio::test]
async fn captcha_pauses_until_feedback() {
    let h = harness(ScriptedProvider::new("test", [ASK, DONE]));
    let created = h.manager.create(CreateTask::new("Sign up")).await.unwrap();

    assert_eq!(
        wait_for(&h.manager, created.id, TaskStatus::Paused).await,
        TaskStatus::Paused
    );
    let pending = h.manager.pending_request(created.id).await.unwrap().unwrap();
    assert_eq!(pending.prompt, "CAPTCHA Challenge: Select all buses");
    assert_eq!(
        pending.context.as_deref(),
        Some("The agent is stuck at a CAPTCHA and needs human assistance.")
    );

    // Parked: no further model calls while waiting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.provider.calls(), 1);
    assert!(h.browser.visited.lock().is_empty(), "actions after ask_human must not run");

    assert!(h
        .manager
        .submit_feedback(created.id, "solved it, continue")
        .await
        .unwrap());
    assert_eq!(
        wait_for(&h.manager, created.id, TaskStatus::Finished).await,
        TaskStatus::Finished
    );

    let transcript = h.provider.transcript();
    let resumed: Vec<&str> = transcript[1].iter().map(|m| m.content.as_str()).collect();
    assert!(resumed.contains(&"Human feedback: solved it, continue"));
    assert!(resumed
        .iter()
        .any(|m| m.contains("Waiting for human input. Request ID: ")));
    assert!(h.manager.pending_request(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn secrets_reach_actions_but_not_the_model() {
    let login = r#"{"current_state":{"next_goal":"Log in"},"action":[{"go_to_url":{"url":"https://example.com/login?pw=<secret>password</secret>"}}]}"#;
    let h = harness(ScriptedProvider::new("test", [login, DONE]));

    let request = CreateTask::new("Log in").with_sensitive_data(HashMap::from([(
        "password".to_string(),
        "hunter2".to_string(),
    )]));
    let created = h.manager.create(request).await.unwrap();
    wait_for(&h.manager, created.id, TaskStatus::Finished).await;

    assert_eq!(
        h.browser.visited.lock().as_slice(),
        ["https://example.com/login?pw=hunter2"]
    );

    for call in h.provider.transcript() {
        for message in call {
            assert!(!message.content.contains("hunter2"), "secret leaked: {}", message.content);
        }
    }
}

#[tokio::test]
async fn stop_interrupts_slow_model_call() {
    let h = harness(ScriptedProvider::new("test", [DONE]).with_latency(Duration::from_secs(30)));
    let created = h.manager.create(CreateTask::new("slow")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    assert!(h.manager.stop(created.id).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.manager.get_status(created.id).await.unwrap(), TaskStatus::Stopped);
}

#[tokio::test]
async fn pause_and_resume_between_steps() {
    let h = harness(
        ScriptedProvider::new("test", [NAVIGATE, NAVIGATE, NAVIGATE, DONE])
            .with_latency(Duration::from_millis(30)),
    );
    let created = h.manager.create(CreateTask::new("browse")).await.unwrap();

    assert!(h.manager.pause(created.id).await);
    let calls_at_pause = h.provider.calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.provider.calls(), calls_at_pause);

    assert!(h.manager.resume(created.id).await);
    assert_eq!(
        wait_for(&h.manager, created.id, TaskStatus::Finished).await,
        TaskStatus::Finished
    );
}

#[tokio::test]
async fn question_on_last_step_waits_for_its_answer() {
    let settings = AgentSettings {
        max_steps: 1,
        ..AgentSettings::default()
    };
    let h = harness_with(ScriptedProvider::new("test", [ASK]), settings);
    let created = h.manager.create(CreateTask::new("Sign up")).await.unwrap();

    assert_eq!(
        wait_for(&h.manager, created.id, TaskStatus::Paused).await,
        TaskStatus::Paused
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.manager.get_status(created.id).await.unwrap(), TaskStatus::Paused);
    assert!(h.manager.pending_request(created.id).await.unwrap().is_some());

    assert!(h.manager.submit_feedback(created.id, "done it").await.unwrap());
    assert_eq!(
        wait_for(&h.manager, created.id, TaskStatus::Finished).await,
        TaskStatus::Finished
    );
    assert!(h.manager.pending_request(created.id).await.unwrap().is_none());
    assert_eq!(h.provider.calls(), 1);
}
