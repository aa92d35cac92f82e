//! Configuration validation
//!
//! This module provides validation logic for configuration files.

use crate::config::types::{Config, Settings, Task};
use crate::error::{BriskError, ConfigError, ConfigResult};
use crate::runner::{TaskRef, TaskRegistry, WatchRule};

/// Validate a complete configuration and build its task registry
pub fn validate_config(config: &Config) -> Result<TaskRegistry, BriskError> {
    validate_settings(&config.settings)?;

    // Validate each task
    for (name, task) in &config.tasks {
        validate_task(name, task)?;
    }

    // Registering also checks references and cycles
    let registry = TaskRegistry::from_config(config)?;

    for (name, rule) in &config.watch {
        validate_watch_rule(name, &rule.files, &rule.tasks, &registry)?;
    }

    Ok(registry)
}

/// Validate a single task
pub fn validate_task(name: &str, task: &Task) -> ConfigResult<()> {
    validate_name("task", name)?;

    for variant in task.variants.keys() {
        validate_name("variant", variant)?;
    }

    Ok(())
}

fn validate_name(kind: &str, name: &str) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} name must not be empty", kind)));
    }
    if name.contains(':') {
        return Err(ConfigError::Invalid(format!(
            "{} name '{}' must not contain ':'",
            kind, name
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!(
            "{} name '{}' must not contain whitespace",
            kind, name
        )));
    }
    Ok(())
}

fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    if let Some(interpreter) = &settings.interpreter {
        if interpreter.is_empty() {
            return Err(ConfigError::Invalid(
                "settings.interpreter must name a program".to_string(),
            ));
        }
    }
    if settings.action_timeout == Some(0) {
        return Err(ConfigError::Invalid(
            "settings.action-timeout must be at least one second".to_string(),
        ));
    }
    Ok(())
}

/// Check that a watch rule has globs that compile and tasks that exist
fn validate_watch_rule(
    name: &str,
    files: &[String],
    tasks: &[String],
    registry: &TaskRegistry,
) -> Result<(), BriskError> {
    if files.is_empty() {
        return Err(ConfigError::Invalid(format!("watch rule '{}' has no files", name)).into());
    }
    if tasks.is_empty() {
        return Err(ConfigError::Invalid(format!("watch rule '{}' has no tasks", name)).into());
    }

    WatchRule::new(name, files.to_vec(), Vec::new())?;

    for task in tasks {
        let reference = TaskRef::parse(task);
        if !registry.contains(&reference.name) {
            return Err(ConfigError::TaskNotFound(reference.name).into());
        }
        registry.get(&reference.name, reference.variant.as_deref())?;
    }
    Ok(())
}
