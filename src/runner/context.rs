//! Build context shared by every step of a process run
//!
//! The context owns the config store. Mutations (build type, `set` steps,
//! flags) go through it, and every read resolves templates against the live
//! store, so a value derived from `build.build_type` always reflects the most
//! recent switch.

use crate::config::{self, Config, ConfigStore, ConfigValue};
use crate::error::{BriskError, ResolutionResult};
use crate::runner::{Resolver, Scope};
use crate::ui::{Reporter, Verbosity};
use crate::utils::absolutize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Key holding the active build type
pub const BUILD_TYPE_KEY: &str = "build.build_type";

/// Key holding the per-process scratch directory
pub const SCRATCH_DIR_KEY: &str = "build.scratch_dir";

/// Key holding the project directory
pub const PROJECT_DIR_KEY: &str = "project.dir";

/// Default timeout for blocking leaf actions
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Process-scoped mutable build state
pub struct BuildContext {
    /// Directory containing the config file; relative paths resolve against it
    pub project_dir: PathBuf,

    /// Configuration file path
    pub config_path: Option<PathBuf>,

    /// Configuration values
    pub store: ConfigStore,

    /// Interpreter for `exec` steps (e.g., ["sh", "-c"])
    pub interpreter: Vec<String>,

    /// Timeout for blocking leaf actions
    pub action_timeout: Duration,

    /// Status output
    pub reporter: Reporter,

    build_type: Option<String>,
    flags: HashMap<String, bool>,
    /// Held so the directory is removed on drop
    _scratch: Option<TempDir>,
    scratch_dir: PathBuf,
}

impl BuildContext {
    /// Create a new context rooted at the current directory
    pub fn new() -> Self {
        let project_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let scratch = tempfile::Builder::new()
            .prefix("brisk-scratch-")
            .tempdir()
            .map_err(|e| log::warn!("could not create scratch directory: {}", e))
            .ok();
        let scratch_dir = match &scratch {
            Some(dir) => dir.path().to_path_buf(),
            None => env::temp_dir().join(format!("brisk-scratch-{}", std::process::id())),
        };

        let mut store = ConfigStore::new();
        store.set_literal(PROJECT_DIR_KEY, project_dir.to_string_lossy());
        store.set_literal(BUILD_TYPE_KEY, "");
        store.set_literal(SCRATCH_DIR_KEY, scratch_dir.to_string_lossy());

        BuildContext {
            project_dir,
            config_path: None,
            store,
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            reporter: Reporter::default(),
            build_type: None,
            flags: HashMap::new(),
            _scratch: scratch,
            scratch_dir,
        }
    }

    /// Build a context from a parsed config file: built-ins, then metadata
    /// as `pkg.*`, then the config `vars` tree
    pub fn from_config(config: &Config, config_path: &Path) -> Result<Self, BriskError> {
        let project_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let project_dir = absolutize(&env::current_dir()?, project_dir);

        let mut ctx = BuildContext::new()
            .with_project_dir(project_dir)
            .with_config_path(config_path.to_path_buf());

        if let Some(record) = config::load_metadata(config, &ctx.project_dir)? {
            ctx.store.merge_metadata("pkg", &record);
        }
        ctx.store.merge_yaml(None, &config.vars)?;

        if let Some(interpreter) = &config.settings.interpreter {
            ctx = ctx.with_interpreter(interpreter.clone());
        }
        if let Some(secs) = config.settings.action_timeout {
            ctx = ctx.with_action_timeout(Duration::from_secs(secs));
        }

        Ok(ctx)
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: PathBuf) -> Self {
        self.store.set_literal(PROJECT_DIR_KEY, dir.to_string_lossy());
        self.project_dir = dir;
        self
    }

    /// Set the configuration file path
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Replace the config store; built-in keys are re-applied on top
    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = store;
        self.store
            .set_literal(PROJECT_DIR_KEY, self.project_dir.to_string_lossy());
        self.store
            .set_literal(BUILD_TYPE_KEY, self.build_type.clone().unwrap_or_default());
        self.store
            .set_literal(SCRATCH_DIR_KEY, self.scratch_dir.to_string_lossy());
        self
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        if !interpreter.is_empty() {
            self.interpreter = interpreter;
        }
        self
    }

    /// Set the leaf action timeout
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.reporter = Reporter::new(verbosity);
        self
    }

    /// Switch the active build type. Later reads of derived keys see the new value.
    pub fn set_build_type(&mut self, build_type: impl Into<String>) {
        let build_type = build_type.into();
        log::debug!(
            "build type {:?} -> {:?}",
            self.build_type.as_deref().unwrap_or(""),
            build_type
        );
        self.store.set_literal(BUILD_TYPE_KEY, build_type.clone());
        self.build_type = Some(build_type);
    }

    /// The active build type, if one was set
    pub fn build_type(&self) -> Option<&str> {
        self.build_type.as_deref()
    }

    /// Overwrite a config key
    pub fn set_value(&mut self, key: impl Into<String>, value: ConfigValue) {
        let key = key.into();
        log::debug!("set {} = {:?}", key, value);
        self.store.set(key, value);
    }

    /// Record a strictness flag
    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.flags.insert(name.into(), value);
    }

    /// Read a flag; `None` until a gate sets it
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }

    /// Resolver over the live store
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.store, &self.project_dir)
    }

    /// Resolver that also sees the options of `scope`
    pub fn resolver_in<'a>(&'a self, scope: &'a Scope) -> Resolver<'a> {
        self.resolver().with_scope(scope)
    }

    /// Fully expanded value of a config key
    pub fn resolve(&self, key: &str) -> ResolutionResult<String> {
        self.resolver().resolve(key)
    }

    /// Expand segments into an absolute path
    pub fn compose<S: AsRef<str>>(&self, segments: &[S]) -> ResolutionResult<PathBuf> {
        self.resolver().compose(segments)
    }

    /// Resolve a path option relative to the project directory
    pub fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        absolutize(&self.project_dir, path)
    }

    /// Per-process scratch directory for transient downloads
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}
