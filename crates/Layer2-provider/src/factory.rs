//! Provider factory - builds and caches model clients by name
//!
//! Callers ask for `(provider, model)`; the factory resolves the provider name
//! case-insensitively against its registered creators and hands back a shared
//! client, building it on first use.

use crate::{
    providers::{openai::OpenAiProvider, scripted::ScriptedProvider},
    Provider, ProviderError,
};
use parking_lot::Mutex;
use pilot_foundation::{Error, ProvidersConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Builds a provider for a model name
pub type ProviderCreator =
    Arc<dyn Fn(&str) -> std::result::Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Reply the built-in scripted provider gives once its script is empty:
/// a step that finishes the task straight away.
pub const SCRIPTED_DONE_RESPONSE: &str = r#"{"current_state":{"evaluation_previous_goal":"Unknown","next_goal":"Finish"},"action":[{"done":{"text":"Scripted run complete"}}]}"#;

/// Cached provider factory
pub struct ProviderFactory {
    creators: HashMap<String, ProviderCreator>,
    cache: Mutex<HashMap<(String, String), Arc<dyn Provider>>>,
}

impl ProviderFactory {
    /// Factory with no creators (tests register their own)
    pub fn new() -> Self {
        Self {
            creators: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Factory with the built-in providers
    ///
    /// `openai_chat` and `openai` share one OpenAI-compatible client; `scripted`
    /// replays [`SCRIPTED_DONE_RESPONSE`] for offline runs.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut factory = Self::new();

        let api_key = config.openai_api_key.clone().unwrap_or_default();
        let base_url = config.openai_base_url.clone();
        let timeout = config.timeout_secs.map(Duration::from_secs);

        let openai: ProviderCreator = Arc::new(move |model: &str| {
            let mut provider = OpenAiProvider::new(api_key.clone(), model);
            if let Some(url) = &base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(timeout) = timeout {
                provider = provider.with_timeout(timeout);
            }
            Ok::<_, ProviderError>(Arc::new(provider) as Arc<dyn Provider>)
        });
        factory.register("openai_chat", openai.clone());
        factory.register("openai", openai);

        factory.register(
            "scripted",
            Arc::new(|model: &str| {
                let provider = ScriptedProvider::new(model, Vec::<String>::new())
                    .with_fallback(SCRIPTED_DONE_RESPONSE);
                Ok::<_, ProviderError>(Arc::new(provider) as Arc<dyn Provider>)
            }),
        );

        factory
    }

    /// Register (or replace) a creator under a provider name
    pub fn register(&mut self, name: impl Into<String>, creator: ProviderCreator) {
        let name = name.into().to_lowercase();
        debug!("Registered provider creator: {}", name);
        self.creators.insert(name, creator);
    }

    /// Register a single ready-made client served for every model name
    pub fn register_instance(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.register(
            name,
            Arc::new(move |_: &str| Ok::<_, ProviderError>(provider.clone())),
        );
    }

    /// Get (or build) the client for `(provider, model)`
    pub fn get(&self, provider: &str, model: &str) -> Result<Arc<dyn Provider>> {
        let name = provider.to_lowercase();
        let key = (name.clone(), model.to_string());

        if let Some(cached) = self.cache.lock().get(&key) {
            return Ok(cached.clone());
        }

        let creator = self.creators.get(&name).ok_or_else(|| {
            Error::ProviderNotFound(format!(
                "Unsupported model provider: {}. Available: {}",
                provider,
                self.list_providers().join(", ")
            ))
        })?;

        let client = creator(model).map_err(Error::from)?;
        info!("Created {} client for model {}", name, model);

        // Two racing callers may both build; the first insert wins.
        let mut cache = self.cache.lock();
        Ok(cache.entry(key).or_insert(client).clone())
    }

    /// Registered provider names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.creators.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, provider: &str) -> bool {
        self.creators.contains_key(&provider.to_lowercase())
    }

    /// Number of cached clients
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}
