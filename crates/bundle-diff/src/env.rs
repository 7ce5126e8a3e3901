//! Per-execution global environment.
//!
//! An [`Environment`] is built from scratch for every single execution and
//! dropped right after it. Nothing here is shared between the native and the
//! bundled run of a case, or between cases.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::bundler::BundleOutput;
use crate::error::Side;
use crate::overrides::FixtureOverride;
use crate::stubs::{ModuleStub, StubContext, StubFunction};
use crate::value::Value;

/// Arguments of one `console.log` call.
pub type ConsoleCall = Vec<Value>;

/// Append-only capture of `console.log` calls for one execution.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    calls: Arc<Mutex<Vec<ConsoleCall>>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, args: ConsoleCall) {
        self.calls.lock().push(args);
    }

    pub fn extend(&self, calls: impl IntoIterator<Item = ConsoleCall>) {
        self.calls.lock().extend(calls);
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain everything captured so far.
    pub fn take(&self) -> Vec<ConsoleCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Stub function that logs `args` to this sink when called.
    pub fn logger(&self, name: impl Into<String>, args: Vec<Value>) -> StubFunction {
        StubFunction::logging(name, self, args)
    }
}

/// A binding installed on `globalThis` before the entries run.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalBinding {
    /// The capturing console of this environment.
    Console,
    /// The host's standard assertion library.
    Assert,
    Value(Value),
}

/// Isolated global scope for one execution.
#[derive(Debug)]
pub struct Environment {
    side: Side,
    console: ConsoleSink,
    globals: BTreeMap<String, GlobalBinding>,
    externals: BTreeMap<String, ModuleStub>,
    files: Option<Arc<BundleOutput>>,
    script: Option<String>,
}

impl Environment {
    /// Environment for running the raw fixture entries.
    pub fn native(overrides: Option<&FixtureOverride>) -> Self {
        Self::inject(Side::Native, overrides, None)
    }

    /// Environment for running bundler output, with reads under the output
    /// directory served from `bundle`.
    pub fn bundled(overrides: Option<&FixtureOverride>, bundle: Arc<BundleOutput>) -> Self {
        Self::inject(Side::Bundled, overrides, Some(bundle))
    }

    fn inject(
        side: Side,
        overrides: Option<&FixtureOverride>,
        files: Option<Arc<BundleOutput>>,
    ) -> Self {
        let console = ConsoleSink::new();

        let mut globals = BTreeMap::new();
        globals.insert("console".to_string(), GlobalBinding::Console);
        globals.insert("assert".to_string(), GlobalBinding::Assert);
        if let Some(extra) = overrides.and_then(FixtureOverride::globals) {
            for (name, value) in extra {
                globals.insert(name, GlobalBinding::Value(value));
            }
        }

        let ctx = StubContext::new(side, console.clone());
        let externals = overrides
            .and_then(|o| o.external_modules())
            .map(|modules| modules.instantiate(&ctx))
            .unwrap_or_default();

        tracing::debug!(
            %side,
            globals = globals.len(),
            externals = externals.len(),
            virtual_fs = files.is_some(),
            "injected environment"
        );

        Self {
            side,
            console,
            globals,
            externals,
            files,
            script: overrides.and_then(FixtureOverride::script).map(str::to_string),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn console(&self) -> &ConsoleSink {
        &self.console
    }

    /// Drain the captured console calls.
    pub fn take_console(&self) -> Vec<ConsoleCall> {
        self.console.take()
    }

    pub fn globals(&self) -> &BTreeMap<String, GlobalBinding> {
        &self.globals
    }

    pub fn externals(&self) -> &BTreeMap<String, ModuleStub> {
        &self.externals
    }

    /// JS inspection the loader runs over the entry namespaces.
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// In-memory files backing the output directory, if any.
    pub fn file_override(&self) -> Option<&BundleOutput> {
        self.files.as_deref()
    }

    /// Read through the file-read override. `None` means "go to disk".
    pub fn read_override(&self, path: &Path) -> Option<&str> {
        self.files.as_deref().and_then(|files| files.get(path))
    }
}
