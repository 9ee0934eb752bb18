//! Browser agent - the step loop behind every task
//!
//! Each step sends the conversation plus the current page to the model,
//! parses the returned actions and runs them. Between steps the loop passes
//! a [`WorkerControl`] checkpoint, which is where pause, resume and stop
//! take effect and where human feedback is picked up.

use crate::action::{ActionContext, ActionRegistry};
use crate::browser::BrowserSession;
use crate::history::MessageHistory;
use crate::output::AgentOutput;
use crate::prompt;
use crate::secrets;
use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_foundation::{AgentConfig, Error, Result};
use pilot_provider::Provider;
use pilot_task::{
    Acknowledgement, FinalResult, HumanInputHandle, Step, StepHistory, TaskId, Worker,
    WorkerControl, WorkerId, WorkerOutcome,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loop limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_steps: u32,
    pub max_actions_per_step: usize,
    /// Consecutive failed steps before the run fails
    pub max_failures: u32,
    /// Messages kept in the conversation
    pub max_history: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_actions_per_step: 10,
            max_failures: 3,
            max_history: 40,
        }
    }
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_actions_per_step: config.max_actions_per_step.max(1),
            ..Self::default()
        }
    }
}

enum StepOutcome {
    Continue,
    Done(String),
}

#[derive(Default)]
struct AgentState {
    messages: MessageHistory,
    steps: Vec<Step>,
    final_result: Option<String>,
    /// Action results for the next state message
    last_results: Vec<String>,
    consecutive_failures: u32,
}

/// LLM-driven worker for one task
pub struct BrowserAgent {
    id: WorkerId,
    task_id: TaskId,
    task: String,
    provider: Arc<dyn Provider>,
    actions: Arc<ActionRegistry>,
    ctx: ActionContext,
    control: WorkerControl,
    settings: AgentSettings,
    state: Mutex<AgentState>,
}

impl BrowserAgent {
    pub fn new(
        task: impl Into<String>,
        provider: Arc<dyn Provider>,
        browser: Arc<dyn BrowserSession>,
        human_input: HumanInputHandle,
    ) -> Self {
        let settings = AgentSettings::default();
        Self {
            id: WorkerId::new(),
            task_id: human_input.task_id(),
            task: task.into(),
            provider,
            actions: Arc::new(ActionRegistry::with_builtins()),
            ctx: ActionContext {
                browser,
                human_input,
                sensitive_data: Arc::new(HashMap::new()),
            },
            control: WorkerControl::new(),
            state: Mutex::new(AgentState {
                messages: MessageHistory::with_limit(settings.max_history),
                ..AgentState::default()
            }),
            settings,
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.state.get_mut().messages = MessageHistory::with_limit(settings.max_history);
        self.settings = settings;
        self
    }

    pub fn with_actions(mut self, actions: Arc<ActionRegistry>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_sensitive_data(mut self, data: HashMap<String, String>) -> Self {
        self.ctx.sensitive_data = Arc::new(data);
        self
    }

    pub fn control(&self) -> &WorkerControl {
        &self.control
    }

    fn system_prompt(&self) -> String {
        prompt::system_prompt(
            &self.actions.definitions(),
            self.settings.max_actions_per_step,
            &secrets::placeholder_names(&self.ctx.sensitive_data),
        )
    }

    async fn run_loop(&self) -> Result<WorkerOutcome> {
        let system = self.system_prompt();
        self.state.lock().messages.add_user(prompt::task_message(&self.task));

        for number in 1..=self.settings.max_steps {
            if self.control.checkpoint().await.is_err() {
                info!("Task {} stopped before step {}", self.task_id, number);
                return Err(Error::Cancelled);
            }

            let feedback = self.control.take_instructions();
            if !feedback.is_empty() {
                let mut state = self.state.lock();
                for text in feedback {
                    info!("Task {} received human feedback", self.task_id);
                    state.messages.add_user(format!("Human feedback: {}", text));
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = self.control.stopped() => {
                    info!("Task {} stopped during step {}", self.task_id, number);
                    return Err(Error::Cancelled);
                }
                outcome = self.step(number, &system) => outcome?,
            };

            if let StepOutcome::Done(text) = outcome {
                self.state.lock().final_result = Some(text.clone());
                return Ok(WorkerOutcome::with_output(text));
            }
        }

        // An input request on the last step still waits for its answer.
        if self.control.is_pause_requested() && self.control.checkpoint().await.is_err() {
            info!("Task {} stopped while waiting after its last step", self.task_id);
            return Err(Error::Cancelled);
        }

        warn!(
            "Task {} reached the maximum of {} steps without finishing",
            self.task_id, self.settings.max_steps
        );
        Ok(WorkerOutcome::default())
    }

    async fn step(&self, number: u32, system: &str) -> Result<StepOutcome> {
        let messages = {
            let page = self.ctx.browser.current_page();
            let mut state = self.state.lock();
            let results = std::mem::take(&mut state.last_results);
            let message = prompt::state_message(number, page.as_ref(), &results);
            state
                .messages
                .add_user(secrets::redact(&message, &self.ctx.sensitive_data));
            state.messages.to_messages()
        };

        debug!("Task {} step {}: asking {}", self.task_id, number, self.provider.model().id);
        let response = match self.provider.complete(messages, Some(system.to_string())).await {
            Ok(response) => response,
            Err(e) => return self.failed_step(number, format!("Model call failed: {}", e)),
        };

        let output = match AgentOutput::parse(&response.content) {
            Ok(output) => output,
            Err(e) => {
                self.state.lock().messages.add_assistant(&response.content);
                return self.failed_step(number, e.to_string());
            }
        };

        {
            let mut state = self.state.lock();
            state.consecutive_failures = 0;
            state
                .messages
                .add_assistant(secrets::redact(&response.content, &self.ctx.sensitive_data));
        }

        let mut calls = output.calls();
        if calls.len() > self.settings.max_actions_per_step {
            warn!(
                "Task {} step {} asked for {} actions, running the first {}",
                self.task_id,
                number,
                calls.len(),
                self.settings.max_actions_per_step
            );
            calls.truncate(self.settings.max_actions_per_step);
        }

        let mut results = Vec::with_capacity(calls.len());
        let mut done = None;

        for call in calls {
            let params = secrets::substitute(&call.params, &self.ctx.sensitive_data);
            let result = self.actions.execute(&call.name, &self.ctx, params).await;
            debug!("Task {} action {}: {:?}", self.task_id, call.name, result);

            results.push(secrets::redact(
                &result.memory_line(&call.name),
                &self.ctx.sensitive_data,
            ));

            if result.is_done {
                done = Some(result.extracted_content.unwrap_or_default());
                break;
            }
            // Remaining actions were planned against a page state that no
            // longer holds once an action failed or a human was asked.
            if result.is_error() || self.control.is_pause_requested() {
                break;
            }
        }

        let step = Step {
            number,
            evaluation_previous_goal: output.current_state.evaluation_previous_goal,
            next_goal: output.current_state.next_goal,
            actions: output.action,
            url: self.current_url(),
        };

        let mut state = self.state.lock();
        state.steps.push(step);
        state.last_results = results;

        Ok(match done {
            Some(text) => StepOutcome::Done(text),
            None => StepOutcome::Continue,
        })
    }

    fn current_url(&self) -> Option<String> {
        self.ctx
            .browser
            .current_url()
            .map(|url| secrets::redact(&url, &self.ctx.sensitive_data))
    }

    fn failed_step(&self, number: u32, message: String) -> Result<StepOutcome> {
        warn!("Task {} step {} failed: {}", self.task_id, number, message);

        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        state.steps.push(Step {
            number,
            evaluation_previous_goal: "Failed".to_string(),
            next_goal: String::new(),
            actions: vec![],
            url: self.current_url(),
        });
        state.last_results = vec![format!("Step error: {}", message)];

        if state.consecutive_failures >= self.settings.max_failures {
            return Err(Error::Worker(format!(
                "Stopping due to {} consecutive failures: {}",
                state.consecutive_failures, message
            )));
        }
        Ok(StepOutcome::Continue)
    }
}

#[async_trait]
impl Worker for BrowserAgent {
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
        info!("Agent {} starting task {}", self.id, self.task_id);
        let result = self.run_loop().await;
        self.control.mark_finished();
        result
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
        StepHistory::Known(self.state.lock().steps.clone())
    }

    fn final_result(&self) -> FinalResult {
        FinalResult::Known(self.state.lock().final_result.clone())
    }
}
