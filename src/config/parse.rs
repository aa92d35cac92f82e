//! Configuration file parsing and discovery

use crate::config::types::Config;
use crate::error::{BriskError, ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde_yaml::{Mapping, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["brisk.yml", "brisk.yaml"];

/// Name of the user-level defaults file inside the config directory
const USER_DEFAULTS_FILE: &str = "config.yml";

/// Find the configuration file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    find_config_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a configuration file from a path
pub fn parse_config_file(path: &Path) -> Result<Config, BriskError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)))?;

    parse_config(&contents)
}

/// Parse configuration from a string
pub fn parse_config(yaml: &str) -> Result<Config, BriskError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Location of the user-level defaults file, if the platform has a config dir
pub fn user_defaults_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "brisk").map(|dirs| dirs.config_dir().join(USER_DEFAULTS_FILE))
}

/// Layer a project config over user defaults: project `vars` and `settings` win
pub fn layer_config(defaults: Config, mut project: Config) -> Config {
    let mut vars = defaults.vars;
    merge_mapping(&mut vars, std::mem::take(&mut project.vars));
    project.vars = vars;

    let mut settings = defaults.settings;
    settings.merge(project.settings);
    project.settings = settings;

    project
}

/// Deep-merge `overlay` into `base`
fn merge_mapping(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        if let Value::Mapping(incoming) = value {
            if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                merge_mapping(existing, incoming);
                continue;
            }
            base.insert(key, Value::Mapping(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Parse a project config file and layer it over the user defaults file
pub fn load_layered(path: &Path) -> Result<Config, BriskError> {
    let project = parse_config_file(path)?;

    match user_defaults_path().filter(|p| p.is_file()) {
        Some(defaults_path) => {
            log::debug!("layering user defaults from {}", defaults_path.display());
            let defaults = parse_config_file(&defaults_path)?;
            Ok(layer_config(defaults, project))
        }
        None => Ok(project),
    }
}

/// Read the package metadata record named by `metadata:`, relative to `base_dir`
pub fn load_metadata(
    config: &Config,
    base_dir: &Path,
) -> Result<Option<serde_json::Value>, BriskError> {
    let Some(rel) = &config.metadata else {
        return Ok(None);
    };
    let path = base_dir.join(rel);
    let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Metadata {
        path: path.clone(),
        error: e.to_string(),
    })?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Load `.env` from the project directory into the process environment
pub fn load_env_file(base_dir: &Path) {
    let path = base_dir.join(".env");
    if path.is_file() {
        if let Err(e) = dotenvy::from_path(&path) {
            log::warn!("ignoring {}: {}", path.display(), e);
        }
    }
}

/// Parse configuration with automatic file discovery
pub fn parse_config_auto() -> Result<(Config, PathBuf), BriskError> {
    let config_path = find_config_file()?;
    let config = load_layered(&config_path)?;
    Ok((config, config_path))
}
