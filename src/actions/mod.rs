//! Leaf actions
//!
//! A leaf action is an opaque operation with external effects (run a program,
//! copy files, download an archive). Steps name an action by kind; the kind is
//! looked up in an [`ActionRegistry`] when the step executes, and the step's
//! options are fully resolved right before the call.

pub mod exec;
pub mod fetch;
pub mod fs;
pub mod launcher;

use crate::error::{ExecutionError, NotFoundError, ResolutionResult};
use crate::runner::{ActionStep, BuildContext, Resolved, Resolver};
use std::collections::{BTreeMap, HashMap};

/// A leaf action implementation
pub trait Action {
    fn run(&self, ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()>;
}

impl<F> Action for F
where
    F: Fn(&BuildContext, &ActionOptions) -> anyhow::Result<()>,
{
    fn run(&self, ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
        self(ctx, options)
    }
}

/// Options of one action step after placeholder expansion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOptions {
    values: BTreeMap<String, Resolved>,
}

impl ActionOptions {
    /// Expand every option of `step`
    pub fn resolve(step: &ActionStep, resolver: &Resolver<'_>) -> ResolutionResult<Self> {
        let values = step
            .options
            .iter()
            .map(|(key, value)| Ok((key.clone(), resolver.value(value)?)))
            .collect::<ResolutionResult<BTreeMap<_, _>>>()?;
        Ok(ActionOptions { values })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Resolved) {
        self.values.insert(key.into(), value);
    }

    /// Builder-style text option
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, Resolved::Text(value.into()));
        self
    }

    /// A required single-valued option
    pub fn get_str(&self, key: &str) -> Result<&str, ExecutionError> {
        match self.values.get(key) {
            Some(Resolved::Text(value)) => Ok(value),
            Some(Resolved::List(_)) => Err(invalid(key, "expected a single value, got a list")),
            None => Err(invalid(key, "option is required")),
        }
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, ExecutionError> {
        if self.values.contains_key(key) {
            self.get_str(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// A list option; a single value counts as a one-element list
    pub fn get_list(&self, key: &str) -> Result<Vec<String>, ExecutionError> {
        self.values
            .get(key)
            .cloned()
            .map(Resolved::into_list)
            .ok_or_else(|| invalid(key, "option is required"))
    }

    pub fn opt_list(&self, key: &str) -> Vec<String> {
        self.values
            .get(key)
            .cloned()
            .map(Resolved::into_list)
            .unwrap_or_default()
    }

    pub fn opt_u64(&self, key: &str) -> Result<Option<u64>, ExecutionError> {
        self.opt_str(key)?
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| invalid(key, &e.to_string()))
            })
            .transpose()
    }
}

fn invalid(name: &str, error: &str) -> ExecutionError {
    ExecutionError::InvalidOption {
        name: name.to_string(),
        error: error.to_string(),
    }
}

/// Leaf action implementations by kind
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Box<dyn Action>>,
}

impl ActionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in kind
    pub fn with_builtins() -> Self {
        let mut registry = ActionRegistry::new();
        registry.register("exec", exec::exec);
        registry.register("mkdir", fs::mkdir);
        registry.register("copy", fs::copy);
        registry.register("delete", fs::delete);
        registry.register("clean", fs::clean);
        registry.register("download", fetch::download);
        registry.register("extract", fetch::extract);
        registry.register("launcher", launcher::launcher);
        registry
    }

    /// Add or replace the implementation of a kind
    pub fn register(&mut self, kind: impl Into<String>, action: impl Action + 'static) {
        self.actions.insert(kind.into(), Box::new(action));
    }

    pub fn get(&self, kind: &str) -> Result<&dyn Action, NotFoundError> {
        self.actions
            .get(kind)
            .map(|action| &**action)
            .ok_or_else(|| NotFoundError::Action(kind.to_string()))
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
