//! # pilot-provider
//!
//! Language-model client abstraction for Pilot.
//!
//! ## Features
//! - OpenAI-compatible chat completions
//! - Automatic retry with exponential backoff
//! - Scripted provider for offline runs and tests
//! - Cached factory keyed by `(provider, model)`

pub mod error;
pub mod factory;
pub mod message;
pub mod providers;
pub mod retry;
pub mod r#trait;

// Core traits and types
pub use factory::{ProviderCreator, ProviderFactory, SCRIPTED_DONE_RESPONSE};
pub use message::{Message, MessageRole};
pub use r#trait::{
    FinishReason, ModelInfo, Provider, ProviderMetadata, ProviderResponse, TokenUsage,
};

// Error and retry
pub use error::ProviderError;
pub use retry::RetryConfig;

// Provider implementations
pub use providers::openai::OpenAiProvider;
pub use providers::scripted::ScriptedProvider;
