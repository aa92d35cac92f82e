//! Watch mode
//!
//! Filesystem events are matched against each rule's globs. A matching rule
//! runs its task chain synchronously; events that arrive during a run are
//! drained afterwards into at most one pending run per rule.

use crate::config;
use crate::error::{BriskError, ConfigError, ConfigResult};
use crate::runner::{BuildContext, Scheduler, TaskRef};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// File globs and the task chain they trigger
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub name: String,
    pub patterns: Vec<String>,
    pub chain: Vec<TaskRef>,
    matcher: GlobSet,
}

impl WatchRule {
    pub fn new(name: &str, patterns: Vec<String>, chain: Vec<TaskRef>) -> ConfigResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    ConfigError::Invalid(format!("watch rule '{}': {}", name, e))
                })?;
            builder.add(glob);
        }
        let matcher = builder
            .build()
            .map_err(|e| ConfigError::Invalid(format!("watch rule '{}': {}", name, e)))?;

        Ok(WatchRule {
            name: name.to_string(),
            patterns,
            chain,
            matcher,
        })
    }

    /// Whether a path relative to the project dir triggers this rule
    pub fn matches(&self, path: &Path) -> bool {
        self.matcher.is_match(path)
    }

    /// Rules named in `names`, or all rules when `names` is empty
    pub fn from_config(config: &config::Config, names: &[String]) -> ConfigResult<Vec<Self>> {
        if let Some(unknown) = names.iter().find(|n| !config.watch.contains_key(n.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "watch rule '{}' is not defined",
                unknown
            )));
        }

        config
            .watch
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(*name))
            .map(|(name, rule)| {
                let chain = rule.tasks.iter().map(|t| TaskRef::parse(t)).collect();
                WatchRule::new(name, rule.files.clone(), chain)
            })
            .collect()
    }
}

/// Source of changed paths
pub trait EventSource {
    /// Block until a change arrives; `None` ends the watch
    fn wait(&mut self) -> Option<PathBuf>;

    /// A change that has already arrived, without blocking
    fn poll(&mut self) -> Option<PathBuf>;
}

/// Rules waiting to run, in the order they were first triggered
#[derive(Debug, Default)]
pub struct PendingRuns {
    order: VecDeque<usize>,
    flags: Vec<bool>,
}

impl PendingRuns {
    pub fn new(rules: usize) -> Self {
        PendingRuns {
            order: VecDeque::new(),
            flags: vec![false; rules],
        }
    }

    /// Mark a rule pending; returns false when it already was
    pub fn push(&mut self, rule: usize) -> bool {
        match self.flags.get_mut(rule) {
            Some(flag) if !*flag => {
                *flag = true;
                self.order.push_back(rule);
                true
            }
            _ => false,
        }
    }

    pub fn next(&mut self) -> Option<usize> {
        let rule = self.order.pop_front()?;
        self.flags[rule] = false;
        Some(rule)
    }
}

/// Counters for a watch session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub runs: usize,
    pub failures: usize,
}

/// Runs watch rules against events from an [`EventSource`]
pub struct WatchController<'a> {
    scheduler: Scheduler<'a>,
    rules: Vec<WatchRule>,
    pending: PendingRuns,
    stats: WatchStats,
}

impl<'a> WatchController<'a> {
    pub fn new(scheduler: Scheduler<'a>, rules: Vec<WatchRule>) -> Self {
        let pending = PendingRuns::new(rules.len());
        WatchController {
            scheduler,
            rules,
            pending,
            stats: WatchStats::default(),
        }
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Process events until the source ends
    pub fn watch(&mut self, ctx: &mut BuildContext, source: &mut dyn EventSource) -> WatchStats {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name.as_str()).collect();
        ctx.reporter
            .info(&format!("Watching for changes ({})", names.join(", ")));

        while let Some(path) = source.wait() {
            self.accept(ctx, &path);
            self.drain(ctx, source);
            while let Some(index) = self.pending.next() {
                self.run_rule(ctx, index);
                self.drain(ctx, source);
            }
        }

        self.stats
    }

    /// Queue every rule matching `path`
    pub fn accept(&mut self, ctx: &BuildContext, path: &Path) {
        let rel = path.strip_prefix(&ctx.project_dir).unwrap_or(path);
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.matches(rel) && self.pending.push(index) {
                log::debug!("{} triggered by {}", rule.name, rel.display());
            }
        }
    }

    fn drain(&mut self, ctx: &BuildContext, source: &mut dyn EventSource) {
        while let Some(path) = source.poll() {
            self.accept(ctx, &path);
        }
    }

    fn run_rule(&mut self, ctx: &mut BuildContext, index: usize) {
        let rule = &self.rules[index];
        ctx.reporter.info(&format!("Change detected, running {}", rule.name));
        self.stats.runs += 1;

        for reference in &rule.chain {
            if let Err(e) = self.scheduler.run_ref(ctx, reference) {
                ctx.reporter.error(&e.to_string());
                log::warn!("watch rule {} failed: {}", rule.name, e);
                self.stats.failures += 1;
                break;
            }
        }
    }
}

/// Recursive filesystem watcher on the project directory
pub struct NotifySource {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    root: PathBuf,
    buffered: VecDeque<PathBuf>,
}

impl NotifySource {
    pub fn new(root: &Path) -> Result<Self, BriskError> {
        let root = root.canonicalize()?;
        let (tx, events) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok(NotifySource {
            _watcher: watcher,
            events,
            root,
            buffered: VecDeque::new(),
        })
    }

    fn buffer(&mut self, event: notify::Result<Event>) {
        match event {
            Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
            Ok(event) => {
                for path in event.paths {
                    let rel = path
                        .strip_prefix(&self.root)
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|_| path.clone());
                    if !self.buffered.contains(&rel) {
                        self.buffered.push_back(rel);
                    }
                }
            }
            Err(e) => log::warn!("watch error: {}", e),
        }
    }
}

impl EventSource for NotifySource {
    fn wait(&mut self) -> Option<PathBuf> {
        while self.buffered.is_empty() {
            let event = self.events.recv().ok()?;
            self.buffer(event);
        }
        self.buffered.pop_front()
    }

    fn poll(&mut self) -> Option<PathBuf> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.buffer(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.buffered.pop_front()
    }
}
