//! Prompt construction

use crate::action::ActionDef;
use crate::browser::PageState;

/// Page text included in each step's state message
const STATE_TEXT_LIMIT: usize = 2_000;

const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "current_state": {
    "evaluation_previous_goal": "Success|Failed|Unknown - short analysis of the last step",
    "memory": "what has been done and what to remember",
    "next_goal": "what the next actions should achieve"
  },
  "action": [ { "action_name": { "param": "value" } } ]
}"#;

/// System prompt listing the available actions
pub fn system_prompt(actions: &[ActionDef], max_actions: usize, secret_names: &[String]) -> String {
    let mut prompt = String::from(
        "You are a browser automation agent. You complete the user's task step by step \
         by choosing actions. Use `done` once the task is complete. If you are blocked by \
         a captcha, a missing form value or anything only a person can resolve, use one \
         of the human actions and wait for their reply.\n\n",
    );

    prompt.push_str("# Actions\n");
    for def in actions {
        prompt.push_str(&format!("- {}: {}\n", def.signature(), def.description));
        for param in &def.parameters {
            prompt.push_str(&format!(
                "    {}{}: {}\n",
                param.name,
                if param.required { "" } else { " (optional)" },
                param.description
            ));
        }
    }

    prompt.push_str(&format!(
        "\nUse at most {} actions per step. Actions run in order; `done` ends the task.\n",
        max_actions
    ));

    if !secret_names.is_empty() {
        prompt.push_str(&format!(
            "\nSensitive values are available only as placeholders. Write <secret>name</secret> \
             where the value is needed. Available names: {}\n",
            secret_names.join(", ")
        ));
    }

    prompt.push_str("\n# Response format\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

/// First message of the conversation
pub fn task_message(task: &str) -> String {
    format!("Your ultimate task is: \"{}\".", task)
}

/// Per-step browser state
pub fn state_message(step: u32, page: Option<&PageState>, results: &[String]) -> String {
    let mut message = format!("Step {}\n", step);

    match page {
        Some(page) => {
            message.push_str(&format!("Current url: {}\n", page.url));
            if !page.title.is_empty() {
                message.push_str(&format!("Title: {}\n", page.title));
            }
            message.push_str(&format!("Page text: {}\n", page.excerpt(STATE_TEXT_LIMIT)));
        }
        None => message.push_str("Current url: about:blank\n"),
    }

    for result in results {
        message.push_str(result);
        message.push('\n');
    }
    message
}
