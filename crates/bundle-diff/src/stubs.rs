//! External module stubs.
//!
//! Names a fixture marks as external are kept out of the bundle and served
//! to both runs by the harness. Each run instantiates the factories afresh
//! against its own [`StubContext`], so a stub that logs does so into that
//! run's console sink only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::env::ConsoleSink;
use crate::error::{ConfigurationError, Side};
use crate::value::Value;

/// Per-run context handed to stub factories.
#[derive(Debug, Clone)]
pub struct StubContext {
    side: Side,
    console: ConsoleSink,
}

impl StubContext {
    pub fn new(side: Side, console: ConsoleSink) -> Self {
        Self { side, console }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// The run's captured console.
    pub fn console(&self) -> &ConsoleSink {
        &self.console
    }
}

/// A function export of a stub module.
#[derive(Debug, Clone)]
pub struct StubFunction {
    name: String,
    returns: Value,
    emit: Option<(ConsoleSink, Vec<Value>)>,
}

impl StubFunction {
    /// Function returning `value` without side effects.
    pub fn returning(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            returns: value.into(),
            emit: None,
        }
    }

    /// Function that calls `console.log(...args)` on `sink` and returns `undefined`.
    pub fn logging(name: impl Into<String>, sink: &ConsoleSink, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            returns: Value::Undefined,
            emit: Some((sink.clone(), args)),
        }
    }

    pub fn with_return(mut self, value: impl Into<Value>) -> Self {
        self.returns = value.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn returns(&self) -> &Value {
        &self.returns
    }

    /// Console arguments emitted on each call.
    pub fn logs(&self) -> Option<&[Value]> {
        self.emit.as_ref().map(|(_, args)| args.as_slice())
    }

    /// Invoke in-process: emit to the bound sink, then return.
    pub fn call(&self) -> Value {
        if let Some((sink, args)) = &self.emit {
            sink.log(args.clone());
        }
        self.returns.clone()
    }
}

/// One export of a stub module.
#[derive(Debug, Clone)]
pub enum StubExport {
    Value(Value),
    Function(StubFunction),
}

/// The exported shape of an external module.
#[derive(Debug, Clone, Default)]
pub struct ModuleStub {
    exports: BTreeMap<String, StubExport>,
}

impl ModuleStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.exports
            .insert(name.into(), StubExport::Value(value.into()));
        self
    }

    /// Export `function` under its own name.
    pub fn function(mut self, function: StubFunction) -> Self {
        self.exports
            .insert(function.name().to_string(), StubExport::Function(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&StubExport> {
        self.exports.get(name)
    }

    pub fn exports(&self) -> impl Iterator<Item = (&String, &StubExport)> {
        self.exports.iter()
    }
}

/// Factory producing a fresh stub for one run.
pub type StubFactory = Arc<dyn Fn(&StubContext) -> ModuleStub + Send + Sync>;

/// Declared external modules of one fixture, keyed by module name.
#[derive(Clone, Default)]
pub struct ExternalModules {
    factories: BTreeMap<String, StubFactory>,
}

impl fmt::Debug for ExternalModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl ExternalModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. Factories that do not need the context ignore it.
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&StubContext) -> ModuleStub + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, factory: StubFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Invoke every factory against `ctx`.
    pub fn instantiate(&self, ctx: &StubContext) -> BTreeMap<String, ModuleStub> {
        self.factories
            .iter()
            .map(|(name, factory)| (name.clone(), factory(ctx)))
            .collect()
    }
}

/// Check that the declared factories cover exactly the required external
/// names, ignoring order.
pub fn validate(
    required: &[String],
    declared: Option<&ExternalModules>,
) -> Result<(), ConfigurationError> {
    let required: BTreeSet<&str> = required.iter().map(String::as_str).collect();
    let declared: BTreeSet<&str> = declared
        .map(|m| m.factories.keys().map(String::as_str).collect())
        .unwrap_or_default();

    if required == declared {
        return Ok(());
    }

    Err(ConfigurationError {
        missing: required
            .difference(&declared)
            .map(|s| s.to_string())
            .collect(),
        extra: declared
            .difference(&required)
            .map(|s| s.to_string())
            .collect(),
    })
}
