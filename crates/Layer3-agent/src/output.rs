//! Model output format
//!
//! ```text
//! {
//!   "current_state": { "evaluation_previous_goal": "...", "memory": "...", "next_goal": "..." },
//!   "action": [ { "go_to_url": { "url": "https://example.com" } } ]
//! }
//! ```

use pilot_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBrain {
    #[serde(default)]
    pub evaluation_previous_goal: String,
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub next_goal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    #[serde(default)]
    pub current_state: AgentBrain,
    #[serde(default)]
    pub action: Vec<Value>,
}

/// One requested action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub name: String,
    pub params: Value,
}

impl ActionCall {
    /// `{ "name": { ...params } }`; anything else is rejected
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let (name, params) = object.iter().next()?;
        Some(Self {
            name: name.clone(),
            params: params.clone(),
        })
    }
}

impl AgentOutput {
    /// Parse a raw completion, tolerating code fences and surrounding prose
    pub fn parse(raw: &str) -> Result<Self> {
        let json = extract_json(raw)
            .ok_or_else(|| Error::Worker("Model response contained no JSON object".to_string()))?;

        serde_json::from_str(json)
            .map_err(|e| Error::Worker(format!("Could not parse model response: {}", e)))
    }

    /// Well-formed calls, in order
    pub fn calls(&self) -> Vec<ActionCall> {
        self.action.iter().filter_map(ActionCall::from_value).collect()
    }
}

fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
