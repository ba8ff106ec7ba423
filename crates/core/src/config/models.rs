//! Configuration models that aggregate all settings.
//!
//! This module provides the unified `AppConfig` structure that combines
//! global settings and process definitions into a single configuration
//! object, plus the helpers that turn it into runtime objects.

use crate::builtin::ConfiguredProcess;
use crate::config::error::{ConfigError, ConfigResult};
use crate::engine::EngineConfig;
use crate::state::ProcessManager;
use crate::store::{open_store, ProcessStore, StoreResult};
use pk_protocol::config_models::GlobalConfig;
use pk_protocol::definition_models::ProcessDefinitionConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Unified application configuration loaded from `.process-kit/` directory.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: Global settings
/// - `processes/*.yaml`: Process definitions
///
/// # Example
///
/// ```rust,no_run
/// use pk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} process definitions", config.processes.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Global settings from `config.toml`.
    pub global: GlobalConfig,

    /// All process definitions loaded from `processes/*.yaml`.
    pub processes: Vec<ProcessDefinitionConfig>,
}

impl AppConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis(self.global.poll_interval_ms),
        }
    }

    /// Open the configured store, resolving relative paths against `root`.
    pub fn open_store(&self, root: &Path) -> StoreResult<Arc<dyn ProcessStore>> {
        open_store(root, &self.global.store)
    }

    /// Resolve every configured definition.
    pub fn definitions(&self) -> ConfigResult<Vec<ConfiguredProcess>> {
        self.processes
            .iter()
            .map(|config| {
                ConfiguredProcess::from_config(config).map_err(|source| ConfigError::Definition {
                    name: config.name.clone(),
                    source,
                })
            })
            .collect()
    }

    /// A registry over `store` with every configured definition registered.
    pub fn build_manager(&self, store: Arc<dyn ProcessStore>) -> ConfigResult<ProcessManager> {
        let manager = ProcessManager::new(self.global.user_id.clone(), store, self.engine_config());
        for definition in self.definitions()? {
            manager.register(Arc::new(definition));
        }
        Ok(manager)
    }
}
