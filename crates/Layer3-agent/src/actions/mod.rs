//! Built-in controller actions

pub mod credentials;
pub mod done;
pub mod human;
pub mod navigation;
