//! Common test utilities

#![allow(dead_code)]

use brisk::actions::{ActionOptions, ActionRegistry};
use brisk::runner::BuildContext;
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::TempDir;

/// Create a temporary directory with a brisk.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("brisk.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Create a test config in a subdirectory
pub fn create_test_config_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("brisk.yml");
    let sub_dir = temp_dir.path().join("subdir");

    fs::write(&config_path, content).unwrap();
    fs::create_dir(&sub_dir).unwrap();

    (temp_dir, config_path, sub_dir)
}

/// Order in which recording actions ran
pub type Recorder = Rc<RefCell<Vec<String>>>;

/// Built-in actions plus `record` (logs its `id` option) and `fail` (logs,
/// then fails)
pub fn recording_actions() -> (ActionRegistry, Recorder) {
    let log: Recorder = Rc::new(RefCell::new(Vec::new()));
    let mut actions = ActionRegistry::with_builtins();

    let record = log.clone();
    actions.register(
        "record",
        move |_: &BuildContext, opts: &ActionOptions| -> anyhow::Result<()> {
            record.borrow_mut().push(opts.get_str("id")?.to_string());
            Ok(())
        },
    );

    let record = log.clone();
    actions.register(
        "fail",
        move |_: &BuildContext, opts: &ActionOptions| -> anyhow::Result<()> {
            record.borrow_mut().push(opts.get_str("id")?.to_string());
            anyhow::bail!("{} failed", opts.get_str("id")?)
        },
    );

    (actions, log)
}
