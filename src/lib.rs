//! Brisk - A YAML-driven build orchestration runner
//!
//! Brisk runs named tasks built from ordered steps. Tasks may have variants,
//! steps may reference other tasks, switch the active build type, or gate
//! one-time setup on the state of the filesystem. Config values are
//! templates resolved against a live store, so a switch of build type is
//! seen by every value derived from it. Watch mode re-runs task chains when
//! matching files change.

// Public modules
pub mod actions;
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use error::{BriskError, Result};

/// Current version of Brisk
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
