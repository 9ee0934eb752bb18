//! Worker provisioning
//!
//! Picks an execution backend for a new task (remote browser session when a
//! session client is configured, local browser otherwise or on any remote
//! failure), builds the worker through the injected factory, and registers it
//! before handing it back.

use crate::manager::HumanInputHandle;
use crate::registry::AgentRegistry;
use crate::task::{BrowserData, CreateTask, TaskId};
use crate::worker::Worker;
use async_trait::async_trait;
use pilot_foundation::{BrowserConfig, Error, PilotConfig, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Chromium flags every backend gets
const BASE_CHROMIUM_ARGS: [&str; 3] = [
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--disable-setuid-sandbox",
];

/// Extra flags for containers and remote sessions
const CONTAINER_CHROMIUM_ARGS: [&str; 2] = ["--disable-gpu", "--disable-software-rasterizer"];

// ============================================================================
// Backends
// ============================================================================

/// A provisioned remote browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub session_id: String,
    pub cdp_url: String,
    pub live_view_url: Option<String>,
}

/// Settings for a locally launched browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBrowser {
    pub headless: bool,
    pub args: Vec<String>,
}

impl LocalBrowser {
    pub fn new(headless: bool, container: bool) -> Self {
        let mut args: Vec<String> = BASE_CHROMIUM_ARGS.iter().map(|a| a.to_string()).collect();
        if container {
            args.extend(CONTAINER_CHROMIUM_ARGS.iter().map(|a| a.to_string()));
            args.push("--single-process".to_string());
        }

        Self { headless, args }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        let container = config.is_container();
        if container {
            info!("Running in container environment, adjusting browser flags");
        }
        Self::new(config.headless, container)
    }
}

impl Default for LocalBrowser {
    fn default() -> Self {
        Self::new(true, false)
    }
}

/// Backend a worker drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserBackend {
    Remote(RemoteSession),
    Local(LocalBrowser),
}

impl BrowserBackend {
    /// Live-view URL; only remote sessions have one
    pub fn live_url(&self) -> Option<&str> {
        match self {
            BrowserBackend::Remote(session) => session.live_view_url.as_deref(),
            BrowserBackend::Local(_) => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, BrowserBackend::Remote(_))
    }

    pub fn chromium_args(&self) -> Vec<String> {
        match self {
            BrowserBackend::Remote(_) => BASE_CHROMIUM_ARGS
                .iter()
                .chain(CONTAINER_CHROMIUM_ARGS.iter())
                .map(|a| a.to_string())
                .collect(),
            BrowserBackend::Local(local) => local.args.clone(),
        }
    }

    pub fn browser_data(&self) -> BrowserData {
        match self {
            BrowserBackend::Remote(session) => BrowserData::Remote {
                session_id: session.session_id.clone(),
            },
            BrowserBackend::Local(local) => BrowserData::Local {
                headless: local.headless,
            },
        }
    }
}

// ============================================================================
// Remote sessions
// ============================================================================

/// Acquires remote browser sessions
#[async_trait]
pub trait RemoteSessionClient: Send + Sync {
    async fn create_session(&self) -> Result<RemoteSession>;
}

/// Anchor Browser session API client
pub struct AnchorSessionClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct AnchorResponse {
    data: AnchorSession,
}

#[derive(Debug, Deserialize)]
struct AnchorSession {
    id: Option<String>,
    cdp_url: Option<String>,
    live_view_url: Option<String>,
}

impl AnchorSessionClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// `Ok(None)` when no Anchor key is configured
    pub fn from_config(config: &BrowserConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.anchor_api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        Self::new(
            api_key,
            config.anchor_base_url.clone(),
            config.session_timeout(),
        )
        .map(Some)
    }

    fn parse_session(body: &str) -> Result<RemoteSession> {
        let response: AnchorResponse = serde_json::from_str(body)
            .map_err(|e| Error::Provisioning(format!("malformed session response: {}", e)))?;

        let data = response.data;
        match (data.id, data.cdp_url) {
            (Some(session_id), Some(cdp_url)) if !session_id.is_empty() && !cdp_url.is_empty() => {
                Ok(RemoteSession {
                    session_id,
                    cdp_url,
                    live_view_url: data.live_view_url,
                })
            }
            _ => Err(Error::Provisioning(
                "session response is missing id or cdp_url".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RemoteSessionClient for AnchorSessionClient {
    async fn create_session(&self) -> Result<RemoteSession> {
        let response = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .header("anchor-api-key", &self.api_key)
            .json(&serde_json::json!({
                "browser": { "headless": { "active": false } }
            }))
            .send()
            .await
            .map_err(|e| Error::Provisioning(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Provisioning(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Provisioning(format!("HTTP {}: {}", status, body)));
        }

        Self::parse_session(&body)
    }
}

// ============================================================================
// Worker construction
// ============================================================================

/// Everything a factory needs to build one worker
pub struct WorkerSpec {
    pub task_id: TaskId,
    pub task: String,
    pub model_provider: String,
    pub model_name: String,
    pub sensitive_data: HashMap<String, String>,
    pub backend: BrowserBackend,
    pub human_input: HumanInputHandle,
}

/// Builds workers for provisioned tasks
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    async fn build(&self, spec: WorkerSpec) -> Result<Arc<dyn Worker>>;
}

/// A registered worker and the backend it was built on
pub struct Provisioned {
    pub worker: Arc<dyn Worker>,
    pub backend: BrowserBackend,
}

/// Backend selection plus worker construction
pub struct Provisioner {
    remote: Option<Arc<dyn RemoteSessionClient>>,
    remote_timeout: Duration,
    local: LocalBrowser,
    factory: Arc<dyn WorkerFactory>,
    default_provider: String,
    default_model: String,
}

impl Provisioner {
    /// Local-only provisioner
    pub fn new(factory: Arc<dyn WorkerFactory>) -> Self {
        Self {
            remote: None,
            remote_timeout: Duration::from_secs(30),
            local: LocalBrowser::default(),
            factory,
            default_provider: "openai_chat".to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    /// Wire up from service config; Anchor is used when its key is set
    pub fn from_config(config: &PilotConfig, factory: Arc<dyn WorkerFactory>) -> Self {
        let mut provisioner = Self::new(factory)
            .with_local(LocalBrowser::from_config(&config.browser))
            .with_default_model(
                config.agent.default_provider.clone(),
                config.agent.default_model.clone(),
            );
        provisioner.remote_timeout = config.browser.session_timeout();

        match AnchorSessionClient::from_config(&config.browser) {
            Ok(Some(client)) => provisioner.with_remote(Arc::new(client)),
            Ok(None) => {
                info!("No ANCHOR_API_KEY configured, tasks will use a local browser");
                provisioner
            }
            Err(e) => {
                warn!("Anchor client unavailable, tasks will use a local browser: {}", e);
                provisioner
            }
        }
    }

    pub fn with_remote(mut self, client: Arc<dyn RemoteSessionClient>) -> Self {
        self.remote = Some(client);
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_local(mut self, local: LocalBrowser) -> Self {
        self.local = local;
        self
    }

    pub fn with_default_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self.default_model = model.into();
        self
    }

    /// Remote session if possible, local browser otherwise. Never fails.
    pub async fn select_backend(&self) -> BrowserBackend {
        let Some(remote) = &self.remote else {
            return BrowserBackend::Local(self.local.clone());
        };

        info!("Attempting to create remote browser session");
        match tokio::time::timeout(self.remote_timeout, remote.create_session()).await {
            Ok(Ok(session)) => {
                info!("Using remote browser session {}", session.session_id);
                BrowserBackend::Remote(session)
            }
            Ok(Err(e)) => {
                warn!("Remote browser session unavailable, falling back to local: {}", e);
                BrowserBackend::Local(self.local.clone())
            }
            Err(_) => {
                warn!(
                    "Remote browser session timed out after {:?}, falling back to local",
                    self.remote_timeout
                );
                BrowserBackend::Local(self.local.clone())
            }
        }
    }

    /// Build and register a worker for `task_id`
    pub async fn provision(
        &self,
        task_id: TaskId,
        request: &CreateTask,
        human_input: HumanInputHandle,
        registry: &AgentRegistry,
    ) -> Result<Provisioned> {
        let backend = self.select_backend().await;

        let model_provider = request
            .model_provider
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.default_provider.clone());
        let model_name = request
            .model_name
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        info!(
            "Creating worker for task {} | Model: {}/{} | Remote: {}",
            task_id,
            model_provider,
            model_name,
            backend.is_remote()
        );

        let spec = WorkerSpec {
            task_id,
            task: request.task.clone(),
            model_provider,
            model_name,
            sensitive_data: request.sensitive_data.clone().unwrap_or_default(),
            backend: backend.clone(),
            human_input,
        };

        let worker = self.factory.build(spec).await?;
        if worker.task_id() != task_id {
            return Err(Error::Internal(format!(
                "factory built a worker for task {} instead of {}",
                worker.task_id(),
                task_id
            )));
        }

        registry.register(worker.clone(), task_id);
        Ok(Provisioned { worker, backend })
    }
}
