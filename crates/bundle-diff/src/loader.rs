//! Execution adapter: run a module graph inside an [`Environment`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::env::{ConsoleCall, Environment};
use crate::error::ExecutionError;
use crate::value::{Bindings, Value};

/// Exports of every entry, keyed by entry file name.
pub type EntryExports = BTreeMap<String, Bindings>;

/// Exports of one evaluated entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleExports {
    /// Absolute path the entry was loaded from.
    pub entry: PathBuf,
    pub bindings: Bindings,
}

/// Evaluates ES module entries.
///
/// Entries are evaluated in order within a single module graph, so modules
/// shared between entries are instantiated once. Console calls are appended
/// to `env.console()`. When `env` carries a file-read override, modules under
/// its output directory are loaded from memory.
#[allow(async_fn_in_trait)]
pub trait ModuleLoader {
    async fn evaluate(
        &self,
        entries: &[PathBuf],
        env: &Environment,
    ) -> Result<Vec<ModuleExports>, ExecutionError>;
}

/// Everything observed from one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub console: Vec<ConsoleCall>,
    pub exports: EntryExports,
}

impl ExecutionResult {
    /// Collect the loader output, re-keying exports by the entry names they
    /// were requested under. `entry_names[i]` names `modules[i]`.
    pub fn collect(
        env: &Environment,
        entry_names: &[String],
        modules: Vec<ModuleExports>,
    ) -> Result<Self, ExecutionError> {
        if modules.len() != entry_names.len() {
            return Err(ExecutionError::new(
                env.side(),
                format!(
                    "loader returned {} module(s) for {} entries",
                    modules.len(),
                    entry_names.len()
                ),
            ));
        }
        let exports = entry_names
            .iter()
            .cloned()
            .zip(modules.into_iter().map(|m| m.bindings))
            .collect();
        Ok(Self {
            console: env.take_console(),
            exports,
        })
    }

    /// Console calls as a single value, for structural diffing.
    pub fn console_value(&self) -> Value {
        Value::Array(self.console.iter().cloned().map(Value::Array).collect())
    }

    /// Exports as a single value, for structural diffing.
    pub fn exports_value(&self) -> Value {
        Value::object(
            self.exports
                .iter()
                .map(|(entry, bindings)| (entry.clone(), Value::object(bindings.clone()))),
        )
    }
}

/// Absolute entry paths for `names` under `dir`.
pub fn entry_paths(dir: &Path, names: &[String]) -> Vec<PathBuf> {
    names.iter().map(|name| dir.join(name)).collect()
}
