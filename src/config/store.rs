//! Hierarchical configuration store
//!
//! Values are kept in their raw, tagged form and addressed by dotted key
//! paths (`build.build_dir`). Expansion happens on every read through
//! [`crate::runner::Resolver`]; the store itself never caches resolved text.

use crate::error::{ConfigError, ConfigResult};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Matches a single `${key}` placeholder
pub fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex is valid"))
}

/// A raw configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// Plain text, used verbatim
    Literal(String),

    /// Text containing at least one `${key}` placeholder
    Template(String),

    /// Path segments, each expanded and then joined into one absolute path
    Path(Vec<String>),

    /// Ordered list of values
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    /// Classify a string as literal or template
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if placeholder_regex().is_match(&s) {
            ConfigValue::Template(s)
        } else {
            ConfigValue::Literal(s)
        }
    }

    /// Build a path composition value
    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConfigValue::Path(segments.into_iter().map(Into::into).collect())
    }

    /// Convert a YAML value. Mappings are only accepted in the `{path: [...]}` form.
    pub fn from_yaml(key: &str, value: &Value) -> ConfigResult<Self> {
        match value {
            Value::Null => Ok(ConfigValue::Literal(String::new())),
            Value::Bool(b) => Ok(ConfigValue::Literal(b.to_string())),
            Value::Number(n) => Ok(ConfigValue::Literal(n.to_string())),
            Value::String(s) => Ok(ConfigValue::text(s.clone())),
            Value::Sequence(seq) => seq
                .iter()
                .map(|item| ConfigValue::from_yaml(key, item))
                .collect::<ConfigResult<Vec<_>>>()
                .map(ConfigValue::List),
            Value::Mapping(map) => match path_segments(map) {
                Some(segments) => Ok(ConfigValue::Path(segments)),
                None => Err(ConfigError::Invalid(format!(
                    "'{}' must be a string, list or {{path: [...]}}",
                    key
                ))),
            },
            Value::Tagged(tagged) => ConfigValue::from_yaml(key, &tagged.value),
        }
    }
}

/// Recognize `{path: [seg, ...]}`
fn path_segments(map: &Mapping) -> Option<Vec<String>> {
    if map.len() != 1 {
        return None;
    }
    let segments = map.get("path")?;
    match segments {
        Value::Sequence(seq) => seq
            .iter()
            .map(|seg| match seg {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

/// Key/value store addressed by dotted paths
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: BTreeMap<String, ConfigValue>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn set(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.values.insert(key.into(), value);
    }

    /// Insert or replace a literal value
    pub fn set_literal(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, ConfigValue::Literal(value.into()));
    }

    /// Get the raw value for a key
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Whether a key is defined
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge a YAML mapping, flattening nested mappings into dotted keys
    pub fn merge_yaml(&mut self, prefix: Option<&str>, map: &Mapping) -> ConfigResult<()> {
        for (key, value) in map {
            let segment = match key {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "config keys must be scalars (under '{}')",
                        prefix.unwrap_or("vars")
                    )))
                }
            };
            let full_key = match prefix {
                Some(p) => format!("{}.{}", p, segment),
                None => segment,
            };

            match value {
                Value::Mapping(nested) if path_segments(nested).is_none() => {
                    self.merge_yaml(Some(&full_key), nested)?;
                }
                other => {
                    let parsed = ConfigValue::from_yaml(&full_key, other)?;
                    self.set(full_key, parsed);
                }
            }
        }
        Ok(())
    }

    /// Merge the top-level scalar fields of a JSON metadata record under `prefix`
    pub fn merge_metadata(&mut self, prefix: &str, record: &serde_json::Value) {
        let Some(fields) = record.as_object() else {
            return;
        };
        for (field, value) in fields {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            // Literal, so a description mentioning `${...}` is never expanded
            self.set_literal(format!("{}.{}", prefix, field), text);
        }
    }
}
