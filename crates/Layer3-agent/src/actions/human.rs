//! Actions that pause the task and wait for a human

use crate::action::{string_param, Action, ActionContext, ActionDef, ActionResult};
use async_trait::async_trait;
use pilot_task::HumanInputRequest;
use serde_json::Value;
use tracing::{error, info};

/// Publish the request and pause; the returned text goes back to the model
async fn request_human_input(ctx: &ActionContext, request: HumanInputRequest) -> ActionResult {
    match ctx.human_input.request_input(request).await {
        Ok(ticket) => ActionResult::content(ticket.message),
        Err(e) => {
            error!("Human input request for task {} failed: {}", ctx.human_input.task_id(), e);
            ActionResult::error(format!("Error requesting human input: {}", e))
        }
    }
}

pub struct GetFormDataAction;

#[async_trait]
impl Action for GetFormDataAction {
    fn definition(&self) -> ActionDef {
        ActionDef::builder("get_form_data", "Need information to fill out a form field")
            .string_param("form_field", "Label of the field", true)
            .build()
    }

    async fn execute(&self, ctx: &ActionContext, params: Value) -> ActionResult {
        let field = match string_param(&params, "form_field") {
            Ok(field) => field,
            Err(missing) => return missing,
        };
        info!("Form field needs a human: {}", field);

        request_human_input(
            ctx,
            HumanInputRequest::text(
                format!("Please provide a value for this form field: {}", field),
                format!("The agent needs input for a form field: {}", field),
            ),
        )
        .await
    }
}

pub struct AskHumanAction;

#[async_trait]
impl Action for AskHumanAction {
    fn definition(&self) -> ActionDef {
        ActionDef::builder("ask_human", "Stuck at captcha")
            .string_param("question", "What the human should solve", true)
            .build()
    }

    async fn execute(&self, ctx: &ActionContext, params: Value) -> ActionResult {
        let question = match string_param(&params, "question") {
            Ok(question) => question,
            Err(missing) => return missing,
        };
        info!("Stuck at captcha: {}", question);

        request_human_input(
            ctx,
            HumanInputRequest::text(
                format!("CAPTCHA Challenge: {}", question),
                "The agent is stuck at a CAPTCHA and needs human assistance.",
            ),
        )
        .await
    }
}

pub struct HumanHandoverAction;

#[async_trait]
impl Action for HumanHandoverAction {
    fn definition(&self) -> ActionDef {
        ActionDef::builder(
            "human_handover",
            "Request human to takeover the session to unblock on a step",
        )
        .string_param("request", "What the human should do", true)
        .build()
    }

    async fn execute(&self, ctx: &ActionContext, params: Value) -> ActionResult {
        let request = match string_param(&params, "request") {
            Ok(request) => request,
            Err(missing) => return missing,
        };
        info!("Human handover: {}", request);

        request_human_input(
            ctx,
            HumanInputRequest::text(
                format!("The agent needs your help: {}", request),
                "The agent has explicitly requested human assistance.",
            ),
        )
        .await
    }
}
