//! Core configuration types
//!
//! This module defines the data structures that represent a brisk.yml configuration file.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Application name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Application usage description (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Package metadata file (e.g. package.json), exposed as `pkg.*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    /// Runner settings
    #[serde(default)]
    pub settings: Settings,

    /// Hierarchical configuration values, addressed as dotted keys
    #[serde(default)]
    pub vars: Mapping,

    /// Tasks defined in the configuration
    #[serde(default, deserialize_with = "deserialize_tasks")]
    pub tasks: BTreeMap<String, Task>,

    /// Watch rules, keyed by rule name
    #[serde(default)]
    pub watch: BTreeMap<String, WatchDef>,
}

/// Runner-wide settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Interpreter for `exec` steps (e.g., ["sh", "-c"])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,

    /// Timeout in seconds for blocking leaf actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_timeout: Option<u64>,
}

impl Settings {
    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(&mut self, other: Settings) {
        if other.interpreter.is_some() {
            self.interpreter = other.interpreter;
        }
        if other.action_timeout.is_some() {
            self.action_timeout = other.action_timeout;
        }
    }
}

/// A task definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Task {
    /// Usage description for help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Longer description for help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether this task is private (hidden from listings)
    #[serde(default)]
    pub private: bool,

    /// Options shared by every variant, visible to steps as `${task.<name>}`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,

    /// Steps run when no variant overrides them
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_steps"
    )]
    pub steps: Option<Vec<StepDef>>,

    /// Named variants of this task
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_variants"
    )]
    pub variants: BTreeMap<String, Variant>,
}

/// A named specialization of a task
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Variant {
    /// Options layered over the task options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,

    /// Steps replacing the task's base steps
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_steps"
    )]
    pub steps: Option<Vec<StepDef>>,
}

/// A step - either a task reference or a detailed step
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StepDef {
    /// Task reference written as `name` or `name:variant`
    Reference(String),

    /// Any other step kind
    Detail(Box<StepDetail>),
}

/// Detailed step specification. Exactly one kind field must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct StepDetail {
    /// Label used in progress output and error messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Task to inline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Variant of the referenced task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Shell command, shorthand for the `exec` action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,

    /// Working directory for `exec`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Leaf action kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Leaf action options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, Value>,

    /// Switch the active build type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_type: Option<String>,

    /// Overwrite config keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<BTreeMap<String, Value>>,

    /// Insert remediation steps when a path is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensure: Option<EnsureDef>,

    /// Set a strictness flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<FlagDef>,

    /// Failures are fatal only while this flag is true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_if: Option<String>,
}

/// Setup gate: run `run` when `missing` does not exist
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnsureDef {
    /// Path whose absence triggers the remediation steps
    pub missing: String,

    /// Message printed before remediation starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Remediation steps
    #[serde(default, deserialize_with = "deserialize_steps")]
    pub run: Vec<StepDef>,
}

/// Strictness gate: set a named flag
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlagDef {
    /// Flag name
    pub name: String,

    /// Set the flag to whether this path exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<String>,

    /// Set the flag to a fixed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
}

/// A watch rule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchDef {
    /// Glob patterns relative to the project directory
    #[serde(deserialize_with = "deserialize_string_list")]
    pub files: Vec<String>,

    /// Chain of `task` or `task:variant` names to re-run
    #[serde(deserialize_with = "deserialize_string_list")]
    pub tasks: Vec<String>,
}

/// Split `name:variant` into its parts
pub fn split_task_ref(reference: &str) -> (String, Option<String>) {
    match reference.split_once(':') {
        Some((name, variant)) if !variant.is_empty() => {
            (name.to_string(), Some(variant.to_string()))
        }
        Some((name, _)) => (name.to_string(), None),
        None => (reference.to_string(), None),
    }
}

/// Custom deserializer for the task map: a bare list is shorthand for `steps`
fn deserialize_tasks<'de, D>(deserializer: D) -> Result<BTreeMap<String, Task>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    let mut tasks = BTreeMap::new();

    for (name, value) in raw {
        let task = match value {
            Value::Sequence(_) | Value::String(_) => Task {
                steps: Some(steps_from_value(value).map_err(D::Error::custom)?),
                ..Task::default()
            },
            Value::Null => Task::default(),
            other => Task::deserialize(other)
                .map_err(|e| D::Error::custom(format!("task '{}': {}", name, e)))?,
        };
        tasks.insert(name, task);
    }

    Ok(tasks)
}

fn steps_from_value(value: Value) -> Result<Vec<StepDef>, serde_yaml::Error> {
    match value {
        Value::Sequence(seq) => seq.into_iter().map(StepDef::deserialize).collect(),
        Value::Null => Ok(Vec::new()),
        single => Ok(vec![StepDef::deserialize(single)?]),
    }
}

/// Custom deserializer for steps that handles both single values and arrays
fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<StepDef>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    steps_from_value(value).map_err(D::Error::custom)
}

fn deserialize_optional_steps<'de, D>(deserializer: D) -> Result<Option<Vec<StepDef>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_steps(deserializer).map(Some)
}

/// Custom deserializer for variants: a list of names or a map of definitions
fn deserialize_variants<'de, D>(deserializer: D) -> Result<BTreeMap<String, Variant>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok((name, Variant::default())),
                _ => Err(D::Error::custom("variant list entries must be strings")),
            })
            .collect(),
        Value::Mapping(map) => map
            .into_iter()
            .map(|(key, def)| {
                let name = key
                    .as_str()
                    .ok_or_else(|| D::Error::custom("variant names must be strings"))?
                    .to_string();
                let variant = match def {
                    Value::Null => Variant::default(),
                    other => Variant::deserialize(other).map_err(D::Error::custom)?,
                };
                Ok((name, variant))
            })
            .collect(),
        Value::Null => Ok(BTreeMap::new()),
        _ => Err(D::Error::custom("variants must be a list or a map")),
    }
}

/// Custom deserializer for a string or a list of strings
fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(D::Error::custom("expected a string")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("expected a string or a list of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_shorthand_task() {
        let yaml = r#"
tasks:
  dev-cli:
    - setup:dev-cli
    - ts:dev-cli
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let task = config.tasks.get("dev-cli").unwrap();
        let steps = task.steps.as_ref().unwrap();
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], StepDef::Reference(r) if r == "setup:dev-cli"));
    }

    #[test]
    fn test_deserialize_variants_as_list() {
        let yaml = r#"
tasks:
  setup:
    steps:
      - build-type: "${task.variant}"
    variants: [dev, dev-cli]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let task = config.tasks.get("setup").unwrap();
        assert_eq!(task.variants.len(), 2);
        assert!(task.variants.contains_key("dev-cli"));
        assert!(task.variants["dev"].steps.is_none());
    }

    #[test]
    fn test_deserialize_gate_steps() {
        let yaml = r#"
tasks:
  setup:
    steps:
      - ensure:
          missing: "${build.java_home_dir}"
          run: [fetch, untar]
      - flag:
          name: types-ready
          exists: includes/JVMTypes.d.ts
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let steps = config.tasks["setup"].steps.clone().unwrap();
        match &steps[0] {
            StepDef::Detail(detail) => {
                let ensure = detail.ensure.as_ref().unwrap();
                assert_eq!(ensure.run.len(), 2);
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &steps[1] {
            StepDef::Detail(detail) => {
                assert_eq!(detail.flag.as_ref().unwrap().name, "types-ready");
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_unknown_step_field_is_rejected() {
        let yaml = r#"
tasks:
  broken:
    steps:
      - exce: "echo typo"
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_split_task_ref() {
        assert_eq!(split_task_ref("ts"), ("ts".to_string(), None));
        assert_eq!(
            split_task_ref("ts:dev-cli"),
            ("ts".to_string(), Some("dev-cli".to_string()))
        );
        assert_eq!(split_task_ref("ts:"), ("ts".to_string(), None));
    }
}
