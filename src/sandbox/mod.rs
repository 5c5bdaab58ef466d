//! Sandbox module containing all execution-related components.

pub mod classifier;
pub mod config;
pub mod executor;
pub mod history;
pub mod io;
pub mod namespace;
