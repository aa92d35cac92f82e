//! Terminal output
//!
//! Progress and status lines go to stderr so that command output on stdout
//! stays clean.

use colored::Colorize;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

/// Verbosity-aware status printer
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    pub verbosity: Verbosity,
}

impl Reporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Reporter { verbosity }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {}", "[INFO]".green(), message);
        }
    }

    /// Print a warning. Shown in quiet mode as well.
    pub fn warn(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "[WARN]".yellow(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "[ERROR]".red().bold(), message);
        }
    }

    /// Print debug message (only in verbose mode)
    pub fn debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{} {}", "[DEBUG]".dimmed(), message);
        }
    }

    /// Print task start message
    pub fn task_start(&self, task: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {}", "Running task:".cyan(), task.bold());
        }
    }

    /// Print the step about to run
    pub fn step(&self, task: &str, step: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {} {}", "[RUN]".blue(), format!("{}:", task).dimmed(), step);
        }
    }

    /// Print task complete message
    pub fn task_complete(&self, task: &str, steps: usize) {
        self.debug(&format!("Task completed: {} ({} steps)", task, steps));
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Reporter::new(Verbosity::Normal)
    }
}
