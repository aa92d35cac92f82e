//! Conditional gates
//!
//! Gates are evaluated when their step is reached, never at flatten time, so
//! they observe whatever earlier steps left on disk. Predicates are a closed
//! set of typed filesystem checks.

use crate::error::ResolutionResult;
use crate::runner::{Resolver, Step};

/// A predicate over external state. Paths are templates, relative to the project dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Exists(String),
    Missing(String),
}

/// Evaluate a single condition
pub fn evaluate(condition: &Condition, resolver: &Resolver<'_>) -> ResolutionResult<bool> {
    match condition {
        Condition::Exists(path) => Ok(resolver.compose(&[path])?.exists()),
        Condition::Missing(path) => Ok(!resolver.compose(&[path])?.exists()),
    }
}

/// Run `steps` ahead of the remaining queue when `missing` does not exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureGate {
    pub missing: String,
    pub message: Option<String>,
    pub steps: Vec<Step>,
}

impl EnsureGate {
    pub fn condition(&self) -> Condition {
        Condition::Missing(self.missing.clone())
    }

    /// Whether the remediation steps must be inserted
    pub fn needs_setup(&self, resolver: &Resolver<'_>) -> ResolutionResult<bool> {
        evaluate(&self.condition(), resolver)
    }
}

/// Where a flag gets its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagSource {
    Exists(String),
    Value(bool),
}

/// Record a named boolean for later steps to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagGate {
    pub name: String,
    pub source: FlagSource,
}

impl FlagGate {
    pub fn evaluate(&self, resolver: &Resolver<'_>) -> ResolutionResult<bool> {
        match &self.source {
            FlagSource::Exists(path) => evaluate(&Condition::Exists(path.clone()), resolver),
            FlagSource::Value(value) => Ok(*value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, ConfigValue};
    use crate::error::ResolutionError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_evaluate_exists_relative_to_base() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("test.txt"), "test").unwrap();

        let store = ConfigStore::new();
        let resolver = Resolver::new(&store, temp_dir.path());

        assert!(evaluate(&Condition::Exists("test.txt".to_string()), &resolver).unwrap());
        assert!(!evaluate(&Condition::Exists("nonexistent.txt".to_string()), &resolver).unwrap());
        assert!(evaluate(&Condition::Missing("nonexistent.txt".to_string()), &resolver).unwrap());
    }

    #[test]
    fn test_ensure_gate_resolves_templates() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ConfigStore::new();
        store.set(
            "build.java_home_dir",
            ConfigValue::path([temp_dir.path().to_str().unwrap(), "vendor", "java_home"]),
        );
        let resolver = Resolver::new(&store, temp_dir.path());
        let gate = EnsureGate {
            missing: "${build.java_home_dir}".to_string(),
            message: None,
            steps: vec![Step::action("download")],
        };

        assert!(gate.needs_setup(&resolver).unwrap());

        fs::create_dir_all(temp_dir.path().join("vendor/java_home")).unwrap();
        assert!(!gate.needs_setup(&resolver).unwrap());
    }

    #[test]
    fn test_gate_with_unknown_key_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new();
        let resolver = Resolver::new(&store, temp_dir.path());
        let gate = EnsureGate {
            missing: "${build.nope}".to_string(),
            message: None,
            steps: vec![Step::action("download")],
        };
        assert_eq!(
            gate.needs_setup(&resolver),
            Err(ResolutionError::Missing("build.nope".to_string()))
        );
    }

    #[test]
    fn test_flag_gate() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new();
        let resolver = Resolver::new(&store, temp_dir.path());

        let exists = FlagGate {
            name: "types-ready".to_string(),
            source: FlagSource::Exists("includes/JVMTypes.d.ts".to_string()),
        };
        assert!(!exists.evaluate(&resolver).unwrap());

        fs::create_dir(temp_dir.path().join("includes")).unwrap();
        fs::write(temp_dir.path().join("includes/JVMTypes.d.ts"), "").unwrap();
        assert!(exists.evaluate(&resolver).unwrap());

        let fixed = FlagGate {
            name: "types-ready".to_string(),
            source: FlagSource::Value(true),
        };
        assert!(fixed.evaluate(&resolver).unwrap());
    }
}
