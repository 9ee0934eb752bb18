//! get_credentials - hand the model placeholders for stored credentials

use crate::action::{string_param, Action, ActionContext, ActionDef, ActionResult};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Sensitive-data keys that make up a login
const USERNAME_KEY: &str = "username";
const PASSWORD_KEY: &str = "password";

pub struct GetCredentialsAction;

#[async_trait]
impl Action for GetCredentialsAction {
    fn definition(&self) -> ActionDef {
        ActionDef::builder("get_credentials", "Get credentials for a website")
            .string_param("website_url", "Website that asks for a login", true)
            .build()
    }

    async fn execute(&self, ctx: &ActionContext, params: Value) -> ActionResult {
        let website_url = match string_param(&params, "website_url") {
            Ok(url) => url,
            Err(missing) => return missing,
        };

        let has = |key: &str| ctx.sensitive_data.contains_key(key);
        if !(has(USERNAME_KEY) && has(PASSWORD_KEY)) {
            info!("No credentials stored for {}", website_url);
            return ActionResult::error(format!(
                "No credentials stored for {}; ask a human instead",
                website_url
            ));
        }

        // Values are substituted at action time; the model only sees names.
        info!("Providing credential placeholders for {}", website_url);
        ActionResult::content(format!(
            "username: <secret>{}</secret> and password: <secret>{}</secret>",
            USERNAME_KEY, PASSWORD_KEY
        ))
    }
}
