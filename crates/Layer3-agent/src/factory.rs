//! Worker factory wiring agents to providers and browsers

use crate::action::ActionRegistry;
use crate::agent::{AgentSettings, BrowserAgent};
use crate::browser::{BrowserSession, HttpBrowser};
use async_trait::async_trait;
use pilot_foundation::{PilotConfig, Result};
use pilot_provider::ProviderFactory;
use pilot_task::{BrowserBackend, Worker, WorkerFactory, WorkerSpec};
use std::sync::Arc;
use tracing::info;

/// Opens a browser session on a provisioned backend
pub type BrowserLauncher =
    Arc<dyn Fn(&BrowserBackend) -> Result<Arc<dyn BrowserSession>> + Send + Sync>;

/// Builds a [`BrowserAgent`] per task
pub struct AgentWorkerFactory {
    providers: Arc<ProviderFactory>,
    actions: Arc<ActionRegistry>,
    settings: AgentSettings,
    launcher: BrowserLauncher,
}

impl AgentWorkerFactory {
    pub fn new(providers: Arc<ProviderFactory>) -> Self {
        Self {
            providers,
            actions: Arc::new(ActionRegistry::with_builtins()),
            settings: AgentSettings::default(),
            launcher: Arc::new(|backend: &BrowserBackend| {
                Ok(Arc::new(HttpBrowser::for_backend(backend)?) as Arc<dyn BrowserSession>)
            }),
        }
    }

    pub fn from_config(config: &PilotConfig) -> Self {
        Self::new(Arc::new(ProviderFactory::from_config(&config.providers)))
            .with_settings(AgentSettings::from(&config.agent))
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = Arc::new(actions);
        self
    }

    pub fn with_browser_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn providers(&self) -> &ProviderFactory {
        &self.providers
    }
}

#[async_trait]
impl WorkerFactory for AgentWorkerFactory {
    async fn build(&self, spec: WorkerSpec) -> Result<Arc<dyn Worker>> {
        let provider = self.providers.get(&spec.model_provider, &spec.model_name)?;
        let browser = (self.launcher)(&spec.backend)?;

        info!(
            "Creating agent for task {} | Model: {}/{}",
            spec.task_id, spec.model_provider, spec.model_name
        );

        let agent = BrowserAgent::new(spec.task, provider, browser, spec.human_input)
            .with_settings(self.settings.clone())
            .with_actions(Arc::clone(&self.actions))
            .with_sensitive_data(spec.sensitive_data);

        Ok(Arc::new(agent))
    }
}
