//! # pilot-foundation
//!
//! Foundation layer for Pilot:
//! - Error: the shared error type and `Result` alias
//! - Config: `PilotConfig` (server, browser, lifecycle, agent, providers)
//! - Storage: `JsonStore` for config files

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    AgentConfig, BrowserConfig, LifecycleConfig, PilotConfig, ProvidersConfig, ServerConfig,
    DEFAULT_ANCHOR_BASE_URL, DEFAULT_API_KEY, PILOT_CONFIG_FILE,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;
