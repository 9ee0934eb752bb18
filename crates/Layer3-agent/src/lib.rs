//! # pilot-agent
//!
//! The browser agent that drives each Pilot task.
//!
//! ## Components
//!
//! - **BrowserAgent**: the step loop, implements `pilot_task::Worker`
//! - **Actions**: controller actions the model can call, including the
//!   human-input actions that pause the task
//! - **BrowserSession**: page navigation and reading
//! - **AgentWorkerFactory**: plugs agents into the task manager
//!
//! ## Usage
//!
//! ```ignore
//! use pilot_agent::AgentWorkerFactory;
//! use pilot_task::{Provisioner, TaskManager};
//!
//! let factory = Arc::new(AgentWorkerFactory::from_config(&config));
//! let manager = TaskManager::new(
//!     config.lifecycle.clone(),
//!     Provisioner::from_config(&config, factory),
//! );
//! ```

pub mod action;
pub mod actions;
pub mod agent;
pub mod browser;
pub mod factory;
pub mod history;
pub mod output;
pub mod prompt;
pub mod secrets;

pub use action::{Action, ActionContext, ActionDef, ActionRegistry, ActionResult};
pub use agent::{AgentSettings, BrowserAgent};
pub use browser::{BrowserSession, HttpBrowser, PageState};
pub use factory::{AgentWorkerFactory, BrowserLauncher};
pub use history::MessageHistory;
pub use output::{ActionCall, AgentBrain, AgentOutput};
