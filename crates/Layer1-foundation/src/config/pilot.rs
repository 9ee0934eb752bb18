//! Pilot Config - unified service settings
//!
//! Load order: defaults → global file → project file → environment.
//! CLI flags are applied on top by the server binary.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Config file name inside a store
pub const PILOT_CONFIG_FILE: &str = "config.json";

/// API key used when none is configured
pub const DEFAULT_API_KEY: &str = "default_insecure_key";

/// Anchor Browser API root
pub const DEFAULT_ANCHOR_BASE_URL: &str = "https://api.anchorbrowser.io";

// ============================================================================
// Pilot Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl PilotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global + project + environment
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        match JsonStore::global() {
            Ok(global) => {
                if let Some(global_config) = global.load_optional::<PilotConfig>(PILOT_CONFIG_FILE)? {
                    debug!("Loaded global config from {}", global.file_path(PILOT_CONFIG_FILE).display());
                    config = global_config;
                }
            }
            Err(e) => debug!("Skipping global config: {}", e),
        }

        match JsonStore::current_project() {
            Ok(project) => {
                if let Some(project_config) = project.load_optional::<PilotConfig>(PILOT_CONFIG_FILE)? {
                    debug!("Loaded project config from {}", project.file_path(PILOT_CONFIG_FILE).display());
                    config = project_config;
                }
            }
            Err(e) => debug!("Skipping project config: {}", e),
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Explicit file + environment
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        let mut config: PilotConfig = store.load(PILOT_CONFIG_FILE)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, store: &JsonStore) -> Result<()> {
        store.save(PILOT_CONFIG_FILE, self)
    }

    /// Apply process environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment in production)
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("API_KEY").filter(|v| !v.is_empty()) {
            self.server.api_key = key;
        }
        if let Some(host) = lookup("PILOT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PILOT_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        if let Some(key) = lookup("ANCHOR_API_KEY").filter(|v| !v.is_empty()) {
            self.browser.anchor_api_key = Some(key);
        }
        if let Some(url) = lookup("ANCHOR_BASE_URL") {
            self.browser.anchor_base_url = url;
        }
        if let Some(headless) = lookup("BROWSER_USE_HEADLESS") {
            self.browser.headless = headless.eq_ignore_ascii_case("true");
        }
        if let Some(container) = lookup("CONTAINER") {
            self.browser.container = Some(container.eq_ignore_ascii_case("true"));
        }

        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.providers.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.providers.openai_base_url = Some(url);
        }
    }

    /// True when the service still runs with the built-in API key
    pub fn uses_default_api_key(&self) -> bool {
        self.server.api_key == DEFAULT_API_KEY
    }
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP listener and authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: default_api_key(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Key masked down to its last four characters, for startup logs
    pub fn masked_api_key(&self) -> String {
        let visible: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let hidden = self.api_key.chars().count().saturating_sub(4);
        format!("{}{}", "*".repeat(hidden), visible)
    }
}

/// Browser backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Remote sessions are only attempted when a key is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_api_key: Option<String>,

    #[serde(default = "default_anchor_base_url")]
    pub anchor_base_url: String,

    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Forces container mode; detected from `/.dockerenv` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<bool>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            anchor_api_key: None,
            anchor_base_url: default_anchor_base_url(),
            session_timeout_secs: default_session_timeout(),
            headless: true,
            container: None,
        }
    }
}

impl BrowserConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn is_container(&self) -> bool {
        self.container
            .unwrap_or_else(|| std::path::Path::new("/.dockerenv").exists())
    }
}

/// Lifecycle timing bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleConfig {
    /// Cooperative exit window after a stop signal
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,

    /// Bound on waiting for a forcibly cancelled background unit
    #[serde(default = "default_cancel_timeout")]
    pub cancel_timeout_ms: u64,

    /// Bound on waiting for a pause/resume acknowledgment
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_ms: u64,

    /// Terminal records older than this are garbage-collected
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: default_stop_grace(),
            cancel_timeout_ms: default_cancel_timeout(),
            settle_timeout_ms: default_settle_timeout(),
            retention_secs: default_retention(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl LifecycleConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Agent defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default = "default_max_actions")]
    pub max_actions_per_step: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            max_steps: default_max_steps(),
            max_actions_per_step: default_max_actions(),
        }
    }
}

/// Language-model credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_api_key() -> String {
    DEFAULT_API_KEY.to_string()
}

fn default_anchor_base_url() -> String {
    DEFAULT_ANCHOR_BASE_URL.to_string()
}

fn default_session_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_stop_grace() -> u64 {
    400
}

fn default_cancel_timeout() -> u64 {
    1000
}

fn default_settle_timeout() -> u64 {
    2000
}

fn default_retention() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_provider() -> String {
    "openai_chat".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_steps() -> u32 {
    100
}

fn default_max_actions() -> usize {
    10
}
