//! Scripted bundler and loader for exercising the verdict engine without a
//! JavaScript runtime.
//!
//! A "module" here is a JSON script:
//!
//! ```json
//! {"log": [["a", 1]], "call": [["external", "fn"]], "exports": {"x": 1},
//!  "export_globals": ["x"], "throw": "boom"}
//! ```
//!
//! `log` entries are console calls, `call` invokes external stub functions,
//! `exports` become the module's bindings and `export_globals` re-exports
//! injected globals. `throw` fails the evaluation.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bundle_diff::bundler::{BundleOutput, BundleRequest, Bundler};
use bundle_diff::env::{Environment, GlobalBinding};
use bundle_diff::error::{BundleError, ExecutionError, Side};
use bundle_diff::fixture::TestCase;
use bundle_diff::loader::{ModuleExports, ModuleLoader};
use bundle_diff::stubs::StubExport;
use bundle_diff::value::{Bindings, Value};
use tempfile::TempDir;

pub const DIST: &str = "/virtual/dist";

#[derive(Debug, Default)]
pub struct Counters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub bundles: AtomicUsize,
    pub native_evaluations: AtomicUsize,
    pub bundled_evaluations: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// "Bundles" by copying entry scripts into memory, optionally rewriting them.
pub struct CopyBundler {
    pub counters: Arc<Counters>,
    rewrite: Box<dyn Fn(&str, &str) -> String>,
    fail_with: Option<String>,
    panic_on: Option<String>,
}

impl CopyBundler {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            rewrite: Box::new(|_, source| source.to_string()),
            fail_with: None,
            panic_on: None,
        }
    }

    /// Rewrite each entry's source; called with (entry file name, source).
    pub fn rewriting(mut self, rewrite: impl Fn(&str, &str) -> String + 'static) -> Self {
        self.rewrite = Box::new(rewrite);
        self
    }

    pub fn failing(mut self, stderr: &str) -> Self {
        self.fail_with = Some(stderr.to_string());
        self
    }

    /// Panic when bundling any entry whose file name is `entry`.
    pub fn panicking_on(mut self, entry: &str) -> Self {
        self.panic_on = Some(entry.to_string());
        self
    }
}

pub struct CopyFarm;

impl Bundler for CopyBundler {
    type Farm = CopyFarm;

    async fn start(&self) -> Result<CopyFarm, BundleError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(CopyFarm)
    }

    async fn bundle(&self, _farm: &CopyFarm, request: &BundleRequest) -> Result<BundleOutput, BundleError> {
        self.counters.bundles.fetch_add(1, Ordering::SeqCst);
        if let Some(stderr) = &self.fail_with {
            return Err(BundleError::Failed {
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            });
        }
        let mut files = BTreeMap::new();
        for entry in &request.entries {
            let name = entry.file_name().unwrap().to_string_lossy().to_string();
            if self.panic_on.as_deref() == Some(name.as_str()) {
                panic!("bundler blew up on {}", name);
            }
            let source = fs::read_to_string(entry)?;
            files.insert(Path::new(DIST).join(&name), (self.rewrite)(&name, &source));
        }
        Ok(BundleOutput::new(PathBuf::from(DIST), files))
    }

    async fn stop(&self, _farm: CopyFarm) -> Result<(), BundleError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Interprets JSON module scripts.
pub struct ScriptLoader {
    pub counters: Arc<Counters>,
}

impl ScriptLoader {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self { counters }
    }
}

impl ModuleLoader for ScriptLoader {
    async fn evaluate(&self, entries: &[PathBuf], env: &Environment) -> Result<Vec<ModuleExports>, ExecutionError> {
        let side = env.side();
        match side {
            Side::Native => self.counters.native_evaluations.fetch_add(1, Ordering::SeqCst),
            Side::Bundled => self.counters.bundled_evaluations.fetch_add(1, Ordering::SeqCst),
        };

        let mut modules = Vec::new();
        for entry in entries {
            let source = match env.read_override(entry) {
                Some(source) => source.to_string(),
                None if side == Side::Bundled => {
                    return Err(ExecutionError::in_entry(side, entry, "Cannot find module"));
                }
                None => fs::read_to_string(entry)
                    .map_err(|e| ExecutionError::in_entry(side, entry, e.to_string()))?,
            };
            let script: serde_json::Value = serde_json::from_str(&source)
                .map_err(|e| ExecutionError::in_entry(side, entry, format!("SyntaxError: {}", e)))?;
            let bindings = run_script(&script, env).map_err(|m| ExecutionError::in_entry(side, entry, m))?;
            modules.push(ModuleExports {
                entry: entry.clone(),
                bindings,
            });
        }
        Ok(modules)
    }
}

fn run_script(script: &serde_json::Value, env: &Environment) -> Result<Bindings, String> {
    if let Some(calls) = script["log"].as_array() {
        for call in calls {
            let args = call
                .as_array()
                .map(|args| args.iter().cloned().map(Value::from).collect())
                .unwrap_or_default();
            env.console().log(args);
        }
    }
    if let Some(calls) = script["call"].as_array() {
        for call in calls {
            let module = call[0].as_str().unwrap_or_default();
            let name = call[1].as_str().unwrap_or_default();
            match env.externals().get(module).and_then(|m| m.get(name)) {
                Some(StubExport::Function(f)) => {
                    f.call();
                }
                _ => return Err(format!("TypeError: {}.{} is not a function", module, name)),
            }
        }
    }
    if let Some(message) = script["throw"].as_str() {
        return Err(message.to_string());
    }

    let mut bindings = Bindings::new();
    if let Some(exports) = script["exports"].as_object() {
        for (name, value) in exports {
            bindings.insert(name.clone(), Value::from(value.clone()));
        }
    }
    if let Some(names) = script["export_globals"].as_array() {
        for name in names.iter().filter_map(|n| n.as_str()) {
            let value = match env.globals().get(name) {
                Some(GlobalBinding::Value(v)) => v.clone(),
                Some(_) => Value::Function(name.to_string()),
                None => return Err(format!("ReferenceError: {} is not defined", name)),
            };
            bindings.insert(name.to_string(), value);
        }
    }
    Ok(bindings)
}

/// A fixture directory with JSON module scripts.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn module(self, name: &str, script: serde_json::Value) -> Self {
        fs::write(self.dir.path().join(name), script.to_string()).unwrap();
        self
    }

    pub fn case(&self, id: &str, entries: &[&str]) -> TestCase {
        TestCase::new(
            id,
            self.dir.path(),
            entries.iter().map(|e| e.to_string()).collect(),
        )
    }
}

pub fn counters() -> Arc<Counters> {
    Arc::new(Counters::default())
}
