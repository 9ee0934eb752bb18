//! Controller actions - what the model can ask the agent to do

use crate::browser::BrowserSession;
use async_trait::async_trait;
use pilot_task::HumanInputHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Definition of an action, rendered into the system prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    /// Unique action name the model uses as the object key
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Parameter name → description
    pub parameters: Vec<ActionParam>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionParam {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ActionDef {
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> ActionDefBuilder {
        ActionDefBuilder {
            name: name.into(),
            description: description.into(),
            parameters: vec![],
        }
    }

    /// One-line signature, e.g. `go_to_url(url)`
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Builder for ActionDef
pub struct ActionDefBuilder {
    name: String,
    description: String,
    parameters: Vec<ActionParam>,
}

impl ActionDefBuilder {
    /// Add a string parameter
    pub fn string_param(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.parameters.push(ActionParam {
            name: name.into(),
            description: description.into(),
            required,
        });
        self
    }

    pub fn build(self) -> ActionDef {
        ActionDef {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
        }
    }
}

/// Context handed to actions during execution
#[derive(Clone)]
pub struct ActionContext {
    pub browser: Arc<dyn BrowserSession>,

    /// Line back into the task manager for human input
    pub human_input: HumanInputHandle,

    /// Placeholder name → secret value
    pub sensitive_data: Arc<HashMap<String, String>>,
}

/// Result of an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Text fed back to the model on the next step
    pub extracted_content: Option<String>,

    pub error: Option<String>,

    /// The task is complete
    #[serde(default)]
    pub is_done: bool,
}

impl ActionResult {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn done(text: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(text.into()),
            is_done: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Line for the model's memory
    pub fn memory_line(&self, action: &str) -> String {
        match (&self.error, &self.extracted_content) {
            (Some(error), _) => format!("Action error ({}): {}", action, error),
            (None, Some(content)) => format!("Action result ({}): {}", action, content),
            (None, None) => format!("Action result ({}): ok", action),
        }
    }
}

/// A controller action
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> String {
        self.definition().name
    }

    fn definition(&self) -> ActionDef;

    /// Execute with parameters; failures are reported in the result
    async fn execute(&self, ctx: &ActionContext, params: Value) -> ActionResult;
}

/// Read a required string parameter
pub(crate) fn string_param(params: &Value, name: &str) -> Result<String, ActionResult> {
    match params.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) if !other.is_null() => Ok(other.to_string()),
        _ => Err(ActionResult::error(format!("Missing parameter '{}'", name))),
    }
}

/// Registry of available actions
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Registry with every built-in controller action
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(crate::actions::done::DoneAction));
        registry.register(Arc::new(crate::actions::navigation::GoToUrlAction));
        registry.register(Arc::new(crate::actions::navigation::ExtractContentAction));
        registry.register(Arc::new(crate::actions::credentials::GetCredentialsAction));
        registry.register(Arc::new(crate::actions::human::GetFormDataAction));
        registry.register(Arc::new(crate::actions::human::AskHumanAction));
        registry.register(Arc::new(crate::actions::human::HumanHandoverAction));

        registry
    }

    pub fn register(&mut self, action: Arc<dyn Action>) {
        let name = action.name();
        self.actions.insert(name, action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// All definitions, sorted by name
    pub fn definitions(&self) -> Vec<ActionDef> {
        let mut defs: Vec<ActionDef> = self.actions.values().map(|a| a.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub async fn execute(&self, name: &str, ctx: &ActionContext, params: Value) -> ActionResult {
        match self.get(name) {
            Some(action) => action.execute(ctx, params).await,
            None => ActionResult::error(format!("Action '{}' not found", name)),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ActionRegistry::with_builtins();
        for name in [
            "done",
            "go_to_url",
            "extract_content",
            "get_credentials",
            "get_form_data",
            "ask_human",
            "human_handover",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn test_signature() {
        let def = ActionDef::builder("go_to_url", "Navigate")
            .string_param("url", "Target URL", true)
            .build();
        assert_eq!(def.signature(), "go_to_url(url)");
    }

    #[test]
    fn test_memory_line() {
        assert_eq!(
            ActionResult::content("hi").memory_line("done"),
            "Action result (done): hi"
        );
        assert!(ActionResult::error("boom").memory_line("x").contains("boom"));
    }

    #[test]
    fn test_string_param() {
        let params = serde_json::json!({ "url": "https://a", "n": 3 });
        assert_eq!(string_param(&params, "url").unwrap(), "https://a");
        assert_eq!(string_param(&params, "n").unwrap(), "3");
        assert!(string_param(&params, "missing").is_err());
    }
}
