//! Process definition models for `.process-kit/processes/*.yaml`.
//!
//! A process definition names a process type and lists its steps in order.
//! Each step names a built-in kind plus the parameters that kind expects; the
//! core crate resolves kinds into executable steps when the definition is
//! registered.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

/// A single step of a configured process.
///
/// The `kind` selects the built-in step; every other key is passed to it as a
/// parameter.
///
/// ```yaml
/// - kind: sleep
///   ms: 300
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StepConfig {
    /// Built-in step kind, e.g. `sleep`, `set-vars`, `emit` or `fail`.
    pub kind: String,

    /// Parameters for the step kind.
    #[serde(flatten)]
    #[ts(skip)]
    pub params: Map<String, Value>,
}

impl StepConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Defines a process type and its ordered steps.
///
/// # Example
///
/// ```yaml
/// name: onboarding
/// description: "Collect profile details, then sync them"
/// steps:
///   - kind: set-vars
///     vars:
///       stage: profile
///   - kind: sleep
///     ms: 500
///   - kind: emit
///     event: synced
///     args: ["profile"]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ProcessDefinitionConfig {
    /// Unique name under which the process type is registered.
    pub name: String,

    /// Free-form description shown by the CLI.
    #[serde(default)]
    pub description: String,

    /// Steps executed one at a time, in order.
    pub steps: Vec<StepConfig>,
}
