//! Provider implementations

pub mod openai;
pub mod scripted;
