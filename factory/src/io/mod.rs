//! I/O helpers for the factory pipeline.

pub mod backend;
pub mod config;
pub mod credentials;
pub mod invoker;
pub mod prompt;
