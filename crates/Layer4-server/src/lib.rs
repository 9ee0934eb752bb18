//! # pilot-server
//!
//! HTTP surface for Pilot:
//! - `api`: `/api/v1` handlers
//! - `auth`: bearer-token middleware
//! - `server`: router, manager wiring, serve loop

pub mod api;
pub mod auth;
pub mod error;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{build_manager, router, serve};
pub use state::AppState;
