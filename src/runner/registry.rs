//! Task registry
//!
//! Maps a task name and optional variant to its ordered steps and options.

use crate::config::{self, ConfigValue};
use crate::error::{BriskError, ConfigError, ConfigResult, NotFoundError};
use crate::runner::{steps_from_config, Step, TaskRef};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Variant used when a task without base steps is invoked by bare name
pub const DEFAULT_VARIANT: &str = "default";

/// Steps and options registered for one (task, variant)
#[derive(Debug, Clone, Default)]
pub struct TaskEntry {
    pub steps: Vec<Step>,
    pub options: BTreeMap<String, ConfigValue>,
}

/// Help text for a task
#[derive(Debug, Clone, Default)]
pub struct TaskInfo {
    pub usage: Option<String>,
    pub description: Option<String>,
    pub private: bool,
}

/// Registered tasks
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: HashMap<TaskRef, TaskEntry>,
    info: BTreeMap<String, TaskInfo>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an ordered step list; replaces any earlier registration
    pub fn register(&mut self, name: &str, variant: Option<&str>, steps: Vec<Step>) {
        self.register_with_options(name, variant, steps, BTreeMap::new());
    }

    /// Store steps together with the options visible as `${task.*}`
    pub fn register_with_options(
        &mut self,
        name: &str,
        variant: Option<&str>,
        steps: Vec<Step>,
        options: BTreeMap<String, ConfigValue>,
    ) {
        self.info.entry(name.to_string()).or_default();
        self.entries
            .insert(TaskRef::new(name, variant), TaskEntry { steps, options });
    }

    /// Attach help text to a task
    pub fn describe(&mut self, name: &str, info: TaskInfo) {
        self.info.insert(name.to_string(), info);
    }

    /// Look up a task. A bare name falls back to the `default` variant.
    pub fn get(&self, name: &str, variant: Option<&str>) -> Result<&TaskEntry, NotFoundError> {
        self.lookup(name, variant).map(|(_, entry)| entry)
    }

    /// Like [`TaskRegistry::get`], also returning the key that matched
    pub fn lookup(
        &self,
        name: &str,
        variant: Option<&str>,
    ) -> Result<(TaskRef, &TaskEntry), NotFoundError> {
        if !self.info.contains_key(name) {
            return Err(NotFoundError::Task(name.to_string()));
        }

        let key = TaskRef::new(name, variant);
        if let Some(entry) = self.entries.get(&key) {
            return Ok((key, entry));
        }

        match variant {
            Some(variant) => Err(NotFoundError::Variant {
                task: name.to_string(),
                variant: variant.to_string(),
            }),
            None => {
                let fallback = TaskRef::new(name, Some(DEFAULT_VARIANT));
                match self.entries.get(&fallback) {
                    Some(entry) => Ok((fallback, entry)),
                    None => Err(NotFoundError::NoDefault(name.to_string())),
                }
            }
        }
    }

    /// Whether a task name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.info.contains_key(name)
    }

    /// Task names with their help text, sorted by name
    pub fn tasks(&self) -> impl Iterator<Item = (&str, &TaskInfo)> {
        self.info.iter().map(|(name, info)| (name.as_str(), info))
    }

    /// Registered variants of a task, sorted
    pub fn variants(&self, name: &str) -> Vec<&str> {
        let mut variants: Vec<&str> = self
            .entries
            .keys()
            .filter(|key| key.name == name)
            .filter_map(|key| key.variant.as_deref())
            .collect();
        variants.sort_unstable();
        variants
    }

    /// Register every task and variant of a config, then validate the reference graph
    pub fn from_config(config: &config::Config) -> Result<Self, BriskError> {
        let mut registry = TaskRegistry::new();

        for (name, task) in &config.tasks {
            let options = convert_options(&task.options)?;
            let base_steps = task
                .steps
                .clone()
                .map(|defs| steps_from_config(name, defs))
                .transpose()?;

            registry.describe(
                name,
                TaskInfo {
                    usage: task.usage.clone(),
                    description: task.description.clone(),
                    private: task.private,
                },
            );

            match &base_steps {
                Some(steps) => {
                    registry.register_with_options(name, None, steps.clone(), options.clone())
                }
                None if task.variants.is_empty() => {
                    registry.register_with_options(name, None, Vec::new(), options.clone())
                }
                None => {}
            }

            for (variant_name, variant) in &task.variants {
                let label = format!("{}:{}", name, variant_name);
                let steps = match (&variant.steps, &base_steps) {
                    (Some(defs), _) => steps_from_config(&label, defs.clone())?,
                    (None, Some(steps)) => steps.clone(),
                    (None, None) => {
                        return Err(ConfigError::Invalid(format!(
                            "variant '{}' has no steps and task '{}' has no base steps",
                            label, name
                        ))
                        .into())
                    }
                };

                let mut merged = options.clone();
                merged.extend(convert_options(&variant.options)?);
                registry.register_with_options(name, Some(variant_name.as_str()), steps, merged);
            }
        }

        registry.validate()?;
        Ok(registry)
    }

    /// Reject references to unknown tasks and self- or mutually-referential tasks
    pub fn validate(&self) -> Result<(), BriskError> {
        let mut keys: Vec<&TaskRef> = self.entries.keys().collect();
        keys.sort();

        let mut visited = HashSet::new();
        for key in keys {
            let mut stack = Vec::new();
            self.check_task_cycle(key, &mut visited, &mut stack)?;
        }
        Ok(())
    }

    /// Recursively check for cycles in task references
    fn check_task_cycle(
        &self,
        key: &TaskRef,
        visited: &mut HashSet<TaskRef>,
        stack: &mut Vec<TaskRef>,
    ) -> Result<(), BriskError> {
        if stack.contains(key) {
            let mut chain: Vec<String> = stack.iter().map(ToString::to_string).collect();
            chain.push(key.to_string());
            return Err(ConfigError::CircularDependency(chain.join(" -> ")).into());
        }

        if visited.contains(key) {
            return Ok(());
        }

        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| NotFoundError::Task(key.to_string()))?;

        stack.push(key.clone());

        for reference in referenced_tasks(&entry.steps) {
            let (resolved, _) = self
                .lookup(&reference.name, reference.variant.as_deref())
                .map_err(|e| {
                    ConfigError::Invalid(format!("task '{}' references {}: {}", key, reference, e))
                })?;
            self.check_task_cycle(&resolved, visited, stack)?;
        }

        stack.pop();
        visited.insert(key.clone());

        Ok(())
    }
}

/// Task references in a step list, including those inside `ensure` blocks
fn referenced_tasks(steps: &[Step]) -> Vec<&TaskRef> {
    let mut refs = Vec::new();
    for step in steps {
        match step {
            Step::Task(reference) => refs.push(reference),
            Step::Ensure(gate) => refs.extend(referenced_tasks(&gate.steps)),
            _ => {}
        }
    }
    refs
}

fn convert_options(
    options: &BTreeMap<String, serde_yaml::Value>,
) -> ConfigResult<BTreeMap<String, ConfigValue>> {
    options
        .iter()
        .map(|(key, value)| Ok((key.clone(), ConfigValue::from_yaml(key, value)?)))
        .collect()
}
