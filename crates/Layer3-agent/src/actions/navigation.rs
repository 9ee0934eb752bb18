//! Page navigation and reading

use crate::action::{string_param, Action, ActionContext, ActionDef, ActionResult};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

/// Characters of page text returned by extract_content
const EXTRACT_LIMIT: usize = 4_000;

pub struct GoToUrlAction;

#[async_trait]
impl Action for GoToUrlAction {
    fn definition(&self) -> ActionDef {
        ActionDef::builder("go_to_url", "Navigate to a URL in the current tab")
            .string_param("url", "Absolute http(s) URL", true)
            .build()
    }

    async fn execute(&self, ctx: &ActionContext, params: Value) -> ActionResult {
        let url = match string_param(&params, "url") {
            Ok(url) => url,
            Err(missing) => return missing,
        };

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return ActionResult::error(format!("Unsupported URL: {}", url));
        }

        match ctx.browser.navigate(&url).await {
            Ok(page) => {
                info!("Navigated to {}", page.url);
                ActionResult::content(format!("Navigated to {} ({})", page.url, page.title))
            }
            Err(e) => {
                warn!("Navigation to {} failed: {}", url, e);
                ActionResult::error(format!("Navigation failed: {}", e))
            }
        }
    }
}

pub struct ExtractContentAction;

#[async_trait]
impl Action for ExtractContentAction {
    fn definition(&self) -> ActionDef {
        ActionDef::builder("extract_content", "Read the text of the current page").build()
    }

    async fn execute(&self, ctx: &ActionContext, _params: Value) -> ActionResult {
        match ctx.browser.current_page() {
            Some(page) => ActionResult::content(format!(
                "Content of {}: {}",
                page.url,
                page.excerpt(EXTRACT_LIMIT)
            )),
            None => ActionResult::error("No page loaded yet"),
        }
    }
}
