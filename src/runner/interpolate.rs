//! Placeholder expansion for config values
//!
//! `${key}` references another config key. Expansion is repeated until no
//! placeholder remains; each resolution call keeps the chain of keys it is
//! currently expanding and fails on a revisit instead of recursing forever.
//!
//! Key namespaces:
//! - `task.<option>`, `task.name`, `task.variant` - options of the task that owns the step
//! - `env.<NAME>` - process environment
//! - anything else - the config store

use crate::config::{placeholder_regex, ConfigStore, ConfigValue};
use crate::error::{ResolutionError, ResolutionResult};
use crate::runner::TaskRef;
use crate::utils::normalize_path;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Upper bound on substitution passes for one string
pub const MAX_PASSES: usize = 16;

/// Options of the task a step came from
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub task: TaskRef,
    pub options: BTreeMap<String, ConfigValue>,
}

impl Scope {
    pub fn new(task: TaskRef, options: BTreeMap<String, ConfigValue>) -> Self {
        Scope { task, options }
    }

    fn lookup(&self, name: &str) -> Option<Cow<'_, ConfigValue>> {
        match name {
            "name" => Some(Cow::Owned(ConfigValue::Literal(self.task.name.clone()))),
            "variant" => self
                .task
                .variant
                .as_ref()
                .map(|v| Cow::Owned(ConfigValue::Literal(v.clone()))),
            option => self.options.get(option).map(Cow::Borrowed),
        }
    }
}

/// A fully expanded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Text(String),
    List(Vec<String>),
}

impl Resolved {
    /// View as a list; text becomes a one-element list
    pub fn into_list(self) -> Vec<String> {
        match self {
            Resolved::Text(s) => vec![s],
            Resolved::List(items) => items,
        }
    }
}

/// Expands placeholders against a store snapshot
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    store: &'a ConfigStore,
    base: &'a Path,
    scope: Option<&'a Scope>,
}

impl<'a> Resolver<'a> {
    /// `base` anchors relative paths in [`Resolver::compose`]
    pub fn new(store: &'a ConfigStore, base: &'a Path) -> Self {
        Resolver {
            store,
            base,
            scope: None,
        }
    }

    /// Make `task.*` keys refer to `scope`
    pub fn with_scope(mut self, scope: &'a Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Fully expanded value of a key
    pub fn resolve(&self, key: &str) -> ResolutionResult<String> {
        self.resolve_key(key, &mut Vec::new())
    }

    /// Expand every placeholder in `text`
    pub fn expand(&self, text: &str) -> ResolutionResult<String> {
        self.expand_with(text, &mut Vec::new())
    }

    /// Expand each segment on its own, then join them into one absolute path.
    /// Absolute segments restart the path, as `path.resolve` does.
    pub fn compose<S: AsRef<str>>(&self, segments: &[S]) -> ResolutionResult<PathBuf> {
        self.compose_with(segments, &mut Vec::new())
    }

    /// Expand a raw value, keeping lists as lists
    pub fn value(&self, value: &ConfigValue) -> ResolutionResult<Resolved> {
        let mut visiting = Vec::new();
        match value {
            ConfigValue::List(items) => items
                .iter()
                .map(|item| self.scalar("<list item>", item, &mut visiting))
                .collect::<ResolutionResult<Vec<_>>>()
                .map(Resolved::List),
            other => self.scalar("<value>", other, &mut visiting).map(Resolved::Text),
        }
    }

    fn lookup(&self, key: &str) -> ResolutionResult<Cow<'a, ConfigValue>> {
        if let Some(name) = key.strip_prefix("env.") {
            return env::var(name)
                .map(|v| Cow::Owned(ConfigValue::text(v)))
                .map_err(|_| ResolutionError::Missing(key.to_string()));
        }
        if let Some(name) = key.strip_prefix("task.") {
            return self
                .scope
                .and_then(|scope| scope.lookup(name))
                .ok_or_else(|| ResolutionError::Missing(key.to_string()));
        }
        self.store
            .get(key)
            .map(Cow::Borrowed)
            .ok_or_else(|| ResolutionError::Missing(key.to_string()))
    }

    fn resolve_key(&self, key: &str, visiting: &mut Vec<String>) -> ResolutionResult<String> {
        if visiting.iter().any(|k| k == key) {
            let mut chain = visiting.clone();
            chain.push(key.to_string());
            return Err(ResolutionError::Cycle(chain.join(" -> ")));
        }

        let value = self.lookup(key)?;
        visiting.push(key.to_string());
        let result = self.scalar(key, &value, visiting);
        visiting.pop();
        result
    }

    fn scalar(
        &self,
        key: &str,
        value: &ConfigValue,
        visiting: &mut Vec<String>,
    ) -> ResolutionResult<String> {
        match value {
            ConfigValue::Literal(text) => Ok(text.clone()),
            ConfigValue::Template(text) => self.expand_with(text, visiting),
            ConfigValue::Path(segments) => self
                .compose_with(segments, visiting)
                .map(|p| p.to_string_lossy().into_owned()),
            ConfigValue::List(_) => Err(ResolutionError::NotScalar(key.to_string())),
        }
    }

    fn expand_with(&self, text: &str, visiting: &mut Vec<String>) -> ResolutionResult<String> {
        let re = placeholder_regex();
        let mut current = text.to_string();

        for _ in 0..MAX_PASSES {
            if !re.is_match(&current) {
                return Ok(current);
            }

            let mut next = String::with_capacity(current.len());
            let mut last = 0;
            for caps in re.captures_iter(&current) {
                let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                next.push_str(&current[last..whole.start()]);
                next.push_str(&self.resolve_key(key.as_str().trim(), visiting)?);
                last = whole.end();
            }
            next.push_str(&current[last..]);
            current = next;
        }

        if re.is_match(&current) {
            log::debug!("giving up on '{}' after {} passes", text, MAX_PASSES);
            return Err(ResolutionError::NonConvergent(text.to_string()));
        }
        Ok(current)
    }

    fn compose_with<S: AsRef<str>>(
        &self,
        segments: &[S],
        visiting: &mut Vec<String>,
    ) -> ResolutionResult<PathBuf> {
        let mut path = self.base.to_path_buf();
        for segment in segments {
            let expanded = self.expand_with(segment.as_ref(), visiting)?;
            if !expanded.is_empty() {
                path.push(expanded);
            }
        }
        Ok(normalize_path(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(pairs: &[(&str, &str)]) -> ConfigStore {
        let mut store = ConfigStore::new();
        for (key, value) in pairs {
            store.set(*key, ConfigValue::text(*value));
        }
        store
    }

    #[test]
    fn test_simple_resolution() {
        let store = store(&[("app.name", "doppio"), ("app.greeting", "hello ${app.name}")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(resolver.resolve("app.greeting").unwrap(), "hello doppio");
    }

    #[test]
    fn test_nested_resolution() {
        let store = store(&[
            ("a", "${b}/a"),
            ("b", "${c}/b"),
            ("c", "root"),
        ]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(resolver.resolve("a").unwrap(), "root/b/a");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let store = store(&[("a", "${b}-x"), ("b", "y")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        let first = resolver.resolve("a").unwrap();
        let second = resolver.resolve("a").unwrap();
        assert_eq!(first, second);
        assert!(!placeholder_regex().is_match(&first));
    }

    #[test]
    fn test_mutual_cycle_is_rejected() {
        let store = store(&[("a", "<${b}>"), ("b", "<${a}>")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        match resolver.resolve("a") {
            Err(ResolutionError::Cycle(chain)) => assert_eq!(chain, "a -> b -> a"),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_rejected() {
        let store = store(&[("a", "x${a}")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert!(matches!(resolver.resolve("a"), Err(ResolutionError::Cycle(_))));
    }

    #[test]
    fn test_missing_key() {
        let store = store(&[("a", "${nope}")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(
            resolver.resolve("a"),
            Err(ResolutionError::Missing("nope".to_string()))
        );
    }

    #[test]
    fn test_repeated_reference_is_not_a_cycle() {
        let store = store(&[("a", "${b}${b}"), ("b", "z")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(resolver.resolve("a").unwrap(), "zz");
    }

    #[test]
    fn test_compose_with_absolute_segment() {
        let store = store(&[("b", "/x/y")]);
        let resolver = Resolver::new(&store, Path::new("/project"));
        let composed = resolver.compose(&["a", "${b}"]).unwrap();
        assert_eq!(composed, Path::new("/project").join("a").join("/x/y"));
        assert_eq!(composed, PathBuf::from("/x/y"));
    }

    #[test]
    fn test_compose_placeholder_in_any_segment() {
        let store = store(&[("root", "/srv/doppio"), ("kind", "dev-cli")]);
        let resolver = Resolver::new(&store, Path::new("/project"));
        let composed = resolver
            .compose(&["${root}", "build", "${kind}", "console/../runner.js"])
            .unwrap();
        assert_eq!(composed, PathBuf::from("/srv/doppio/build/dev-cli/runner.js"));
    }

    #[test]
    fn test_path_value_resolves_to_string() {
        let mut store = store(&[("build.type", "release")]);
        store.set("build.dir", ConfigValue::path(["/p", "build", "${build.type}"]));
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(resolver.resolve("build.dir").unwrap(), "/p/build/release");
    }

    #[test]
    fn test_list_is_not_scalar() {
        let mut store = ConfigStore::new();
        store.set("files", ConfigValue::List(vec![ConfigValue::text("a")]));
        store.set("x", ConfigValue::text("${files}"));
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(
            resolver.resolve("x"),
            Err(ResolutionError::NotScalar("files".to_string()))
        );
    }

    #[test]
    fn test_value_expands_list_items() {
        let store = store(&[("dir", "build")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        let value = ConfigValue::List(vec![
            ConfigValue::text("${dir}/a.js"),
            ConfigValue::text("b.js"),
        ]);
        assert_eq!(
            resolver.value(&value).unwrap(),
            Resolved::List(vec!["build/a.js".to_string(), "b.js".to_string()])
        );
    }

    #[test]
    fn test_task_scope() {
        let store = store(&[("build.dir", "/p/build")]);
        let mut options = BTreeMap::new();
        options.insert("dest".to_string(), ConfigValue::text("${build.dir}/doppio"));
        let scope = Scope::new(TaskRef::new("launcher", Some("doppio")), options);
        let resolver = Resolver::new(&store, Path::new("/p")).with_scope(&scope);

        assert_eq!(resolver.expand("${task.dest}").unwrap(), "/p/build/doppio");
        assert_eq!(resolver.expand("${task.variant}").unwrap(), "doppio");
        assert_eq!(resolver.expand("${task.name}").unwrap(), "launcher");
        assert!(resolver.expand("${task.src}").is_err());
    }

    #[test]
    fn test_task_keys_need_a_scope() {
        let store = ConfigStore::new();
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(
            resolver.expand("${task.dest}"),
            Err(ResolutionError::Missing("task.dest".to_string()))
        );
    }

    #[test]
    fn test_environment_namespace() {
        env::set_var("BRISK_TEST_JAVA_HOME", "/opt/jdk");
        let store = ConfigStore::new();
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(
            resolver.expand("${env.BRISK_TEST_JAVA_HOME}/bin").unwrap(),
            "/opt/jdk/bin"
        );
        env::remove_var("BRISK_TEST_JAVA_HOME");

        assert!(resolver.expand("${env.BRISK_TEST_UNSET_VAR}").is_err());
    }

    #[test]
    fn test_self_referencing_environment_value_terminates() {
        env::set_var("BRISK_TEST_LOOP", "${env.BRISK_TEST_LOOP}");
        let store = ConfigStore::new();
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert!(matches!(
            resolver.expand("${env.BRISK_TEST_LOOP}"),
            Err(ResolutionError::Cycle(_))
        ));
        env::remove_var("BRISK_TEST_LOOP");
    }

    #[test]
    fn test_environment_value_with_placeholder_is_expanded() {
        env::set_var("BRISK_TEST_OUT", "${build.dir}/out");
        let store = store(&[("build.dir", "/p/build")]);
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(
            resolver.expand("${env.BRISK_TEST_OUT}").unwrap(),
            "/p/build/out"
        );
        env::remove_var("BRISK_TEST_OUT");
    }

    #[test]
    fn test_literal_values_are_not_expanded() {
        let mut store = ConfigStore::new();
        store.set_literal("pkg.description", "JVM in JS; run ${MAIN} from the shell");
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(
            resolver.resolve("pkg.description").unwrap(),
            "JVM in JS; run ${MAIN} from the shell"
        );
    }

    #[test]
    fn test_no_interpolation() {
        let store = ConfigStore::new();
        let resolver = Resolver::new(&store, Path::new("/p"));
        assert_eq!(resolver.expand("No variables here").unwrap(), "No variables here");
    }
}
