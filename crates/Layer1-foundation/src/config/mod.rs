//! Config - service settings
//!
//! - `pilot.rs` - PilotConfig and its sections

mod pilot;

pub use pilot::{
    AgentConfig, BrowserConfig, LifecycleConfig, PilotConfig, ProvidersConfig, ServerConfig,
    DEFAULT_ANCHOR_BASE_URL, DEFAULT_API_KEY, PILOT_CONFIG_FILE,
};
