//! Command execution
//!
//! Runs a shell command through the context interpreter.

use crate::actions::ActionOptions;
use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::BuildContext;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `exec` action: options `command` and optional `dir`
pub fn exec(ctx: &BuildContext, options: &ActionOptions) -> anyhow::Result<()> {
    let command = options.get_str("command")?;
    let working_dir = match options.opt_str("dir")? {
        Some(dir) => ctx.path(dir),
        None => ctx.project_dir.clone(),
    };

    run_command(command, &working_dir, &ctx.interpreter, ctx.action_timeout)?;
    Ok(())
}

/// Run `command` and wait for it, killing the child after `timeout`
pub fn run_command(
    command: &str,
    working_dir: &Path,
    interpreter: &[String],
    timeout: Duration,
) -> ExecutionResult<()> {
    let (program, args) = interpreter
        .split_first()
        .ok_or_else(|| ExecutionError::InvalidOption {
            name: "interpreter".to_string(),
            error: "interpreter is empty".to_string(),
        })?;

    log::debug!("exec `{}` in {}", command, working_dir.display());

    let mut child = Command::new(program)
        .args(args)
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            log::warn!("failed to spawn {}: {}", program, e);
            ExecutionError::CommandFailed(None)
        })?;

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecutionError::Timeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                log::warn!("failed to wait for `{}`: {}", command, e);
                return Err(ExecutionError::CommandFailed(None));
            }
        }
    };

    if !status.success() {
        return Err(ExecutionError::CommandFailed(status.code()));
    }

    Ok(())
}
