//! done - mark the task complete

use crate::action::{string_param, Action, ActionContext, ActionDef, ActionResult};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

pub struct DoneAction;

#[async_trait]
impl Action for DoneAction {
    fn definition(&self) -> ActionDef {
        ActionDef::builder("done", "Task has been completed")
            .string_param("text", "Final answer for the user", true)
            .build()
    }

    async fn execute(&self, _ctx: &ActionContext, params: Value) -> ActionResult {
        let text = match string_param(&params, "text") {
            Ok(text) => text,
            Err(missing) => return missing,
        };

        info!("Task completed: {}", text);
        ActionResult::done(text)
    }
}
