//! Configuration parsing and validation
//!
//! This module handles parsing of brisk.yml configuration files, the
//! key/value store they populate, and validation of configuration structure.

pub mod parse;
pub mod schema;
pub mod store;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use store::*;
pub use types::*;
