//! Errors raised while loading a `.process-kit/` project.

use crate::error::ProcessError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// `config.toml` or a process file exists but cannot be read.
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `config.toml` is not valid TOML or has unknown keys.
    #[error("Bad settings in {path}: {source}")]
    Settings {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A file under `.process-kit/processes/` is not valid YAML.
    #[error("Bad process file {path}: {source}")]
    ProcessFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// A process file parsed but describes no usable process, for example a
    /// second file claiming a name already taken.
    #[error("Rejected process file {path}: {reason}")]
    InvalidProcessFile { path: PathBuf, reason: String },

    /// A process file names a step kind that cannot be built.
    #[error("Process \"{name}\" cannot be built: {source}")]
    Definition {
        name: String,
        source: ProcessError,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
