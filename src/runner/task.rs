//! Runtime task and step types
//!
//! This differs from the config types by validating each step down to exactly
//! one kind and by converting option values into tagged [`ConfigValue`]s.

use crate::config::{self, split_task_ref, ConfigValue};
use crate::error::{ConfigError, ConfigResult};
use crate::runner::{EnsureGate, FlagGate, FlagSource};
use std::collections::BTreeMap;
use std::fmt;

/// Reference to a task, optionally naming a variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskRef {
    pub name: String,
    pub variant: Option<String>,
}

impl TaskRef {
    pub fn new(name: impl Into<String>, variant: Option<&str>) -> Self {
        TaskRef {
            name: name.into(),
            variant: variant.map(str::to_string),
        }
    }

    /// Parse `name` or `name:variant`
    pub fn parse(reference: &str) -> Self {
        let (name, variant) = split_task_ref(reference);
        TaskRef { name, variant }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}:{}", self.name, variant),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A leaf action invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionStep {
    /// Display label
    pub label: Option<String>,
    /// Registered action kind (`exec`, `copy`, ...)
    pub kind: String,
    /// Raw options, resolved right before the action runs
    pub options: BTreeMap<String, ConfigValue>,
    /// Failures only abort the chain while this flag is true
    pub strict_if: Option<String>,
}

impl ActionStep {
    pub fn new(kind: impl Into<String>) -> Self {
        ActionStep {
            label: None,
            kind: kind.into(),
            options: BTreeMap::new(),
            strict_if: None,
        }
    }

    /// Builder-style option setter
    pub fn option(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn strict_if(mut self, flag: impl Into<String>) -> Self {
        self.strict_if = Some(flag.into());
        self
    }
}

/// One entry of a task's step list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Opaque external operation
    Action(ActionStep),
    /// Another task, inlined when the list is flattened
    Task(TaskRef),
    /// Switch the active build type
    BuildType(String),
    /// Overwrite config keys
    Set(BTreeMap<String, ConfigValue>),
    /// Insert remediation steps when a prerequisite is missing
    Ensure(EnsureGate),
    /// Record a strictness flag
    Flag(FlagGate),
}

impl Step {
    /// Shorthand for an action step without options
    pub fn action(kind: impl Into<String>) -> Self {
        Step::Action(ActionStep::new(kind))
    }

    /// Shorthand for a task reference
    pub fn task(reference: &str) -> Self {
        Step::Task(TaskRef::parse(reference))
    }

    /// Label used in progress output and errors
    pub fn label(&self) -> String {
        match self {
            Step::Action(action) => match (&action.label, action.options.get("command")) {
                (Some(label), _) => label.clone(),
                (None, Some(ConfigValue::Literal(cmd) | ConfigValue::Template(cmd)))
                    if action.kind == "exec" =>
                {
                    cmd.clone()
                }
                _ => action.kind.clone(),
            },
            Step::Task(reference) => reference.to_string(),
            Step::BuildType(build_type) => format!("build-type {}", build_type),
            Step::Set(values) => {
                let keys: Vec<&str> = values.keys().map(String::as_str).collect();
                format!("set {}", keys.join(", "))
            }
            Step::Ensure(gate) => format!("ensure {}", gate.missing),
            Step::Flag(gate) => format!("flag {}", gate.name),
        }
    }

    /// Convert a config step, rejecting steps with zero or several kinds
    pub fn from_config(task: &str, index: usize, def: config::StepDef) -> ConfigResult<Self> {
        let invalid = |reason: String| ConfigError::InvalidStep {
            task: task.to_string(),
            index,
            reason,
        };

        let detail = match def {
            config::StepDef::Reference(reference) => {
                if reference.trim().is_empty() {
                    return Err(invalid("empty task reference".to_string()));
                }
                return Ok(Step::task(reference.trim()));
            }
            config::StepDef::Detail(detail) => *detail,
        };

        let kinds: Vec<&str> = [
            ("task", detail.task.is_some()),
            ("exec", detail.exec.is_some()),
            ("action", detail.action.is_some()),
            ("build-type", detail.build_type.is_some()),
            ("set", detail.set.is_some()),
            ("ensure", detail.ensure.is_some()),
            ("flag", detail.flag.is_some()),
        ]
        .into_iter()
        .filter_map(|(kind, present)| present.then_some(kind))
        .collect();

        match kinds.len() {
            0 => return Err(invalid("no step kind given".to_string())),
            1 => {}
            _ => return Err(invalid(format!("conflicting step kinds: {}", kinds.join(", ")))),
        }

        if detail.variant.is_some() && detail.task.is_none() {
            return Err(invalid("'variant' requires 'task'".to_string()));
        }
        if detail.dir.is_some() && detail.exec.is_none() {
            return Err(invalid("'dir' requires 'exec'".to_string()));
        }
        if !detail.with.is_empty() && detail.action.is_none() {
            return Err(invalid("'with' requires 'action'".to_string()));
        }
        if detail.strict_if.is_some() && detail.exec.is_none() && detail.action.is_none() {
            return Err(invalid("'strict-if' applies to exec and action steps".to_string()));
        }

        let options = |values: BTreeMap<String, serde_yaml::Value>| {
            values
                .into_iter()
                .map(|(key, value)| -> ConfigResult<(String, ConfigValue)> {
                    let parsed = ConfigValue::from_yaml(&key, &value)?;
                    Ok((key, parsed))
                })
                .collect::<ConfigResult<BTreeMap<_, _>>>()
        };

        if let Some(name) = detail.task {
            let mut reference = TaskRef::parse(&name);
            if detail.variant.is_some() {
                reference.variant = detail.variant;
            }
            return Ok(Step::Task(reference));
        }

        if let Some(command) = detail.exec {
            let mut step = ActionStep::new("exec").option("command", ConfigValue::text(command));
            if let Some(dir) = detail.dir {
                step = step.option("dir", ConfigValue::text(dir));
            }
            step.label = detail.name;
            step.strict_if = detail.strict_if;
            return Ok(Step::Action(step));
        }

        if let Some(kind) = detail.action {
            return Ok(Step::Action(ActionStep {
                label: detail.name,
                kind,
                options: options(detail.with)?,
                strict_if: detail.strict_if,
            }));
        }

        if let Some(build_type) = detail.build_type {
            return Ok(Step::BuildType(build_type));
        }

        if let Some(values) = detail.set {
            return Ok(Step::Set(options(values)?));
        }

        if let Some(ensure) = detail.ensure {
            let steps = ensure
                .run
                .into_iter()
                .enumerate()
                .map(|(i, def)| Step::from_config(task, i, def))
                .collect::<ConfigResult<Vec<_>>>()?;
            if steps.is_empty() {
                return Err(invalid("'ensure' needs at least one step in 'run'".to_string()));
            }
            return Ok(Step::Ensure(EnsureGate {
                missing: ensure.missing,
                message: ensure.message,
                steps,
            }));
        }

        if let Some(flag) = detail.flag {
            let source = match (flag.exists, flag.value) {
                (Some(path), None) => FlagSource::Exists(path),
                (None, Some(value)) => FlagSource::Value(value),
                _ => {
                    return Err(invalid(
                        "'flag' needs exactly one of 'exists' or 'value'".to_string(),
                    ))
                }
            };
            return Ok(Step::Flag(FlagGate {
                name: flag.name,
                source,
            }));
        }

        Err(invalid("no step kind given".to_string()))
    }
}

/// Convert a list of config steps
pub fn steps_from_config(task: &str, defs: Vec<config::StepDef>) -> ConfigResult<Vec<Step>> {
    defs.into_iter()
        .enumerate()
        .map(|(index, def)| Step::from_config(task, index, def))
        .collect()
}
