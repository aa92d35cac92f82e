//! Task execution engine
//!
//! This module resolves templates against the build context, flattens task
//! references, evaluates gates and runs steps, either once or on file changes.

pub mod context;
pub mod interpolate;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod watch;
pub mod when;

// Re-export main types
pub use context::*;
pub use interpolate::*;
pub use registry::*;
pub use scheduler::*;
pub use task::*;
pub use watch::*;
pub use when::*;
