//! Task scheduler
//!
//! A run first flattens the requested task into a list of steps by inlining
//! every task reference depth-first. Unknown tasks and reference cycles are
//! therefore reported before any step has side effects, and so are action
//! kinds with no registered implementation. The flat list is then
//! executed from a queue; a gate that needs remediation splices its steps in
//! right after itself, ahead of everything still queued.

use crate::actions::{ActionOptions, ActionRegistry};
use crate::config::ConfigValue;
use crate::error::{BriskError, ConfigError, ExecutionError};
use crate::runner::{BuildContext, Resolved, Scope, Step, TaskRef, TaskRegistry};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

/// A step ready to run, with the task it came from
#[derive(Debug, Clone)]
pub struct FlatStep {
    pub step: Step,
    /// Task (and variant) that owns the step
    pub origin: TaskRef,
    /// Options visible to the step as `task.*`
    pub scope: Rc<Scope>,
    /// Task references that led to this step, outermost first
    pub trail: Vec<String>,
    /// Inserted by an `ensure` gate
    pub setup: bool,
}

/// What executing one step asks of the queue
#[derive(Debug)]
pub enum Outcome {
    Done,
    Insert(Vec<FlatStep>),
}

/// Counters for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub inserted: usize,
    pub lenient_failures: usize,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.executed += other.executed;
        self.inserted += other.inserted;
        self.lenient_failures += other.lenient_failures;
    }
}

/// Runs tasks from a registry with a set of leaf actions
#[derive(Clone, Copy)]
pub struct Scheduler<'a> {
    registry: &'a TaskRegistry,
    actions: &'a ActionRegistry,
}

impl<'a> Scheduler<'a> {
    pub fn new(registry: &'a TaskRegistry, actions: &'a ActionRegistry) -> Self {
        Scheduler { registry, actions }
    }

    /// Inline every task reference reachable from `name`, depth-first
    pub fn flatten(&self, name: &str, variant: Option<&str>) -> Result<Vec<FlatStep>, BriskError> {
        let mut out = Vec::new();
        self.flatten_ref(&TaskRef::new(name, variant), &[], false, &mut out)?;
        Ok(out)
    }

    fn flatten_ref(
        &self,
        reference: &TaskRef,
        trail: &[String],
        setup: bool,
        out: &mut Vec<FlatStep>,
    ) -> Result<(), BriskError> {
        let (key, entry) = self
            .registry
            .lookup(&reference.name, reference.variant.as_deref())?;
        let label = key.to_string();

        if trail.contains(&label) {
            let mut chain = trail.to_vec();
            chain.push(label);
            return Err(ConfigError::CircularDependency(chain.join(" -> ")).into());
        }

        let mut trail = trail.to_vec();
        trail.push(label);

        let scope = Rc::new(Scope::new(key.clone(), entry.options.clone()));
        self.flatten_steps(&entry.steps, &key, &scope, &trail, setup, out)
    }

    fn flatten_steps(
        &self,
        steps: &[Step],
        origin: &TaskRef,
        scope: &Rc<Scope>,
        trail: &[String],
        setup: bool,
        out: &mut Vec<FlatStep>,
    ) -> Result<(), BriskError> {
        for step in steps {
            match step {
                Step::Task(reference) => self.flatten_ref(reference, trail, setup, out)?,
                other => out.push(FlatStep {
                    step: other.clone(),
                    origin: origin.clone(),
                    scope: Rc::clone(scope),
                    trail: trail.to_vec(),
                    setup,
                }),
            }
        }
        Ok(())
    }

    /// Every action kind a run may reach, including gated setup steps, must be registered
    fn check_actions<'s, I>(&self, steps: I, seen: &mut HashSet<String>) -> Result<(), BriskError>
    where
        I: IntoIterator<Item = &'s Step>,
    {
        for step in steps {
            match step {
                Step::Action(action) => {
                    self.actions.get(&action.kind)?;
                }
                Step::Ensure(gate) => self.check_actions(&gate.steps, seen)?,
                Step::Task(reference) => {
                    let (key, entry) = self
                        .registry
                        .lookup(&reference.name, reference.variant.as_deref())?;
                    if seen.insert(key.to_string()) {
                        self.check_actions(&entry.steps, seen)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Run a task to completion or to its first failing step
    pub fn run(
        &self,
        ctx: &mut BuildContext,
        name: &str,
        variant: Option<&str>,
    ) -> Result<RunSummary, BriskError> {
        let reference = TaskRef::new(name, variant);
        let flat = self.flatten(name, variant)?;
        self.check_actions(flat.iter().map(|f| &f.step), &mut HashSet::new())?;
        let mut queue: VecDeque<FlatStep> = flat.into();
        let mut summary = RunSummary::default();

        ctx.reporter.task_start(&reference.to_string());

        while let Some(flat) = queue.pop_front() {
            let origin = flat.origin.to_string();
            match &flat.step {
                Step::Action(_) => ctx.reporter.step(&origin, &flat.step.label()),
                other => ctx.reporter.debug(&format!("{}: {}", origin, other.label())),
            }

            match self.execute(ctx, &flat) {
                Ok(Outcome::Done) => {}
                Ok(Outcome::Insert(steps)) => {
                    summary.inserted += steps.len();
                    for step in steps.into_iter().rev() {
                        queue.push_front(step);
                    }
                }
                Err(error) if self.is_lenient(ctx, &flat) => {
                    let message = format!("{} failed (lenient): {:#}", flat.step.label(), error);
                    ctx.reporter.warn(&message);
                    log::warn!("{}", message);
                    summary.lenient_failures += 1;
                }
                Err(error) => {
                    ctx.reporter.error(&format!("{} failed at {}", origin, flat.step.label()));
                    return Err(failure(&flat, error).into());
                }
            }
            summary.executed += 1;
        }

        ctx.reporter.task_complete(&reference.to_string(), summary.executed);
        Ok(summary)
    }

    pub fn run_ref(
        &self,
        ctx: &mut BuildContext,
        reference: &TaskRef,
    ) -> Result<RunSummary, BriskError> {
        self.run(ctx, &reference.name, reference.variant.as_deref())
    }

    /// Run several invocations in order, stopping at the first failure
    pub fn run_all(
        &self,
        ctx: &mut BuildContext,
        invocations: &[TaskRef],
    ) -> Result<RunSummary, BriskError> {
        let mut total = RunSummary::default();
        for reference in invocations {
            total.absorb(self.run_ref(ctx, reference)?);
        }
        Ok(total)
    }

    /// Execute one flattened step against the live context
    pub fn execute(&self, ctx: &mut BuildContext, flat: &FlatStep) -> anyhow::Result<Outcome> {
        match &flat.step {
            Step::Action(action) => {
                let options = ActionOptions::resolve(action, &ctx.resolver_in(&flat.scope))?;
                self.actions.get(&action.kind)?.run(ctx, &options)?;
            }
            Step::BuildType(build_type) => {
                let build_type = ctx.resolver_in(&flat.scope).expand(build_type)?;
                if build_type.is_empty() {
                    anyhow::bail!("build type resolved to an empty string");
                }
                ctx.set_build_type(build_type);
            }
            Step::Set(values) => {
                let mut resolved = Vec::with_capacity(values.len());
                for (key, value) in values {
                    let value = match ctx.resolver_in(&flat.scope).value(value)? {
                        Resolved::Text(text) => ConfigValue::Literal(text),
                        Resolved::List(items) => ConfigValue::List(
                            items.into_iter().map(ConfigValue::Literal).collect(),
                        ),
                    };
                    resolved.push((key.clone(), value));
                }
                for (key, value) in resolved {
                    ctx.set_value(key, value);
                }
            }
            Step::Ensure(gate) => {
                if gate.needs_setup(&ctx.resolver_in(&flat.scope))? {
                    if let Some(message) = &gate.message {
                        ctx.reporter.info(message);
                    }
                    let mut inserted = Vec::new();
                    self.flatten_steps(
                        &gate.steps,
                        &flat.origin,
                        &flat.scope,
                        &flat.trail,
                        true,
                        &mut inserted,
                    )?;
                    return Ok(Outcome::Insert(inserted));
                }
                log::debug!("{} exists, skipping setup", gate.missing);
            }
            Step::Flag(gate) => {
                let value = gate.evaluate(&ctx.resolver_in(&flat.scope))?;
                log::debug!("flag {} = {}", gate.name, value);
                ctx.set_flag(gate.name.clone(), value);
            }
            Step::Task(reference) => {
                let mut inserted = Vec::new();
                self.flatten_ref(reference, &flat.trail, flat.setup, &mut inserted)?;
                return Ok(Outcome::Insert(inserted));
            }
        }
        Ok(Outcome::Done)
    }

    fn is_lenient(&self, ctx: &BuildContext, flat: &FlatStep) -> bool {
        match &flat.step {
            Step::Action(action) => action
                .strict_if
                .as_deref()
                .map_or(false, |flag| ctx.flag(flag) == Some(false)),
            _ => false,
        }
    }
}

fn failure(flat: &FlatStep, source: anyhow::Error) -> ExecutionError {
    let task = flat.origin.to_string();
    let step = flat.step.label();
    if flat.setup {
        ExecutionError::SetupFailed { task, step, source }
    } else {
        ExecutionError::StepFailure { task, step, source }
    }
}
