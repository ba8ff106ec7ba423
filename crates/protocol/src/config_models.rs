//! Global configuration models for `.process-kit/config.toml`.
//!
//! This module defines the structure of the global configuration file that
//! controls project-wide settings for process-kit.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Default interval, in milliseconds, at which a paused process re-reads its
/// record when no wake-up signal arrives.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default location of the sqlite database, relative to the project root.
pub const DEFAULT_SQLITE_PATH: &str = ".process-kit/processes.db";

/// Which persistence backend stores process records.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Records live in memory and vanish with the process.
    #[default]
    Memory,

    /// Records are kept in an embedded sqlite database.
    Sqlite,
}

/// Persistence settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StoreConfig {
    /// The backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend, relative to the project root.
    #[serde(default = "default_sqlite_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> String {
    DEFAULT_SQLITE_PATH.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Represents global settings from `.process-kit/config.toml`.
///
/// # Example
///
/// ```toml
/// # .process-kit/config.toml
/// user-id = "aries"
/// poll-interval-ms = 500
///
/// [store]
/// backend = "sqlite"
/// path = ".process-kit/processes.db"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalConfig {
    /// Owner recorded on every process created from this project.
    #[serde(default)]
    pub user_id: String,

    /// How often a paused process re-checks its state without a wake-up.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Persistence settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            store: StoreConfig::default(),
        }
    }
}
