//! Configuration file loader for `.process-kit/` directory structure.
//!
//! This module provides functionality to load and parse all configuration files
//! from the `.process-kit/` directory, including:
//! - `config.toml`: Global settings
//! - `processes/*.yaml`: Process definitions

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use pk_protocol::config_models::GlobalConfig;
use pk_protocol::definition_models::ProcessDefinitionConfig;
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// Name of the configuration directory inside a project root.
pub const CONFIG_DIR: &str = ".process-kit";

/// Loads all configuration from the `.process-kit/` directory.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.process-kit/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. Missing directories or
/// files yield defaults rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid TOML or YAML syntax
/// - Two process definitions share a name
///
/// # Example
///
/// ```rust,no_run
/// use pk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} processes", config.processes.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let pk_dir = root.join(CONFIG_DIR);

    if !pk_dir.exists() {
        tracing::debug!(path = %pk_dir.display(), "no config directory, using defaults");
        return Ok(AppConfig::default());
    }

    let global = load_global_config(&pk_dir)?;
    let processes = load_processes(&pk_dir)?;
    tracing::debug!(
        path = %pk_dir.display(),
        processes = processes.len(),
        "configuration loaded"
    );

    Ok(AppConfig { global, processes })
}

/// Loads global configuration from `config.toml`.
fn load_global_config(pk_dir: &Path) -> ConfigResult<GlobalConfig> {
    let config_path = pk_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;

    toml::from_str(&content).map_err(|source| ConfigError::Settings {
        path: config_path,
        source,
    })
}

/// Loads all process definitions from `processes/*.yaml` and `*.yml`.
///
/// Files are read in name order so the result is stable.
fn load_processes(pk_dir: &Path) -> ConfigResult<Vec<ProcessDefinitionConfig>> {
    let processes_dir = pk_dir.join("processes");

    if !processes_dir.exists() {
        return Ok(Vec::new());
    }

    let mut processes = Vec::new();
    let mut seen = HashSet::new();

    for entry in WalkDir::new(&processes_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConfigError::Scan {
            path: processes_dir.clone(),
            source,
        })?;

        let path = entry.path();

        let ext = path.extension().and_then(|s| s.to_str());
        if ext != Some("yaml") && ext != Some("yml") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let process: ProcessDefinitionConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::ProcessFile {
                path: path.to_path_buf(),
                source,
            })?;

        if !seen.insert(process.name.clone()) {
            return Err(ConfigError::InvalidProcessFile {
                path: path.to_path_buf(),
                reason: format!("duplicate process name \"{}\"", process.name),
            });
        }

        processes.push(process);
    }

    Ok(processes)
}
