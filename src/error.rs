//! Error types for Brisk

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Brisk operations
pub type Result<T> = std::result::Result<T, BriskError>;

/// Main error type for Brisk
#[derive(Error, Debug)]
pub enum BriskError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Template resolution errors
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Unknown task, variant or action
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// Task execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Filesystem watcher errors
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Metadata (package.json) parsing errors
    #[error("Metadata parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Step {index} of task '{task}' is invalid: {reason}")]
    InvalidStep {
        task: String,
        index: usize,
        reason: String,
    },

    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Failed to read metadata file '{path}': {error}")]
    Metadata { path: PathBuf, error: String },
}

/// Placeholder expansion errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Config key '{0}' is not defined")]
    Missing(String),

    #[error("Cyclic config reference: {0}")]
    Cycle(String),

    #[error("Expansion of '{0}' did not converge")]
    NonConvergent(String),

    #[error("Config key '{0}' is a list, expected a single value")]
    NotScalar(String),
}

/// Lookup failures in the task and action registries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Task '{0}' is not defined")]
    Task(String),

    #[error("Task '{task}' has no variant '{variant}'")]
    Variant { task: String, variant: String },

    #[error("Task '{0}' has no default steps; name a variant")]
    NoDefault(String),

    #[error("Unknown action '{0}'")]
    Action(String),
}

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task '{task}' failed at step '{step}': {source}")]
    StepFailure {
        task: String,
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Setup for task '{task}' failed at step '{step}': {source}")]
    SetupFailed {
        task: String,
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Command failed with exit code {0:?}")]
    CommandFailed(Option<i32>),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid option value for '{name}': {error}")]
    InvalidOption { name: String, error: String },
}

impl ExecutionError {
    /// Name of the task that owned the failing step, if any
    pub fn task(&self) -> Option<&str> {
        match self {
            ExecutionError::StepFailure { task, .. } | ExecutionError::SetupFailed { task, .. } => {
                Some(task)
            }
            _ => None,
        }
    }

    /// Label of the failing step, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            ExecutionError::StepFailure { step, .. } | ExecutionError::SetupFailed { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for template resolution
pub type ResolutionResult<T> = std::result::Result<T, ResolutionError>;
