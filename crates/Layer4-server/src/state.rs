//! Shared handler state

use pilot_task::TaskManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub manager: TaskManager,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(manager: TaskManager, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            manager,
            api_key: api_key.into(),
        }
    }
}
