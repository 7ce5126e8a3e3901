//! Per-fixture overrides: skip reasons, external module stubs, extra globals
//! and export inspection callbacks.
//!
//! The table is keyed by fixture path relative to the fixture root. The
//! built-in entries cover the rollup `chunking-form` samples; the harness
//! config can add or replace entries declaratively.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::loader::EntryExports;
use crate::stubs::{ExternalModules, ModuleStub, StubFunction};
use crate::value::{Bindings, Value};

/// Produces extra globals for one run.
pub type GlobalsFactory = Arc<dyn Fn() -> Bindings + Send + Sync>;

/// Inspects the exports of a run. An `Err` (or a panic) fails the case.
pub type InspectFn = Arc<dyn Fn(&EntryExports) -> Result<(), String> + Send + Sync>;

/// Overrides for one fixture.
#[derive(Clone, Default)]
pub struct FixtureOverride {
    skip: Option<String>,
    external_modules: Option<ExternalModules>,
    globals: Option<GlobalsFactory>,
    run: Option<InspectFn>,
    /// JS function source called with the entry namespaces after they load.
    script: Option<String>,
}

impl fmt::Debug for FixtureOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureOverride")
            .field("skip", &self.skip)
            .field("external_modules", &self.external_modules)
            .field("globals", &self.globals.is_some())
            .field("run", &self.run.is_some())
            .field("script", &self.script)
            .finish()
    }
}

impl FixtureOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn with_external_modules(mut self, modules: ExternalModules) -> Self {
        self.external_modules = Some(modules);
        self
    }

    pub fn with_globals<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Bindings + Send + Sync + 'static,
    {
        self.globals = Some(Arc::new(factory));
        self
    }

    pub fn with_run<F>(mut self, inspect: F) -> Self
    where
        F: Fn(&EntryExports) -> Result<(), String> + Send + Sync + 'static,
    {
        self.run = Some(Arc::new(inspect));
        self
    }

    /// Inspection evaluated by the loader itself: a JS function expression
    /// that receives the array of entry namespaces. It can use the fixture's
    /// live exports, and anything it logs is part of the compared console.
    pub fn with_script(mut self, source: impl Into<String>) -> Self {
        self.script = Some(source.into());
        self
    }

    /// Skip reason. An empty reason means "run normally".
    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref().filter(|reason| !reason.is_empty())
    }

    pub fn external_modules(&self) -> Option<&ExternalModules> {
        self.external_modules.as_ref()
    }

    /// Fresh globals from the factory.
    pub fn globals(&self) -> Option<Bindings> {
        self.globals.as_ref().map(|factory| factory())
    }

    pub fn inspector(&self) -> Option<&InspectFn> {
        self.run.as_ref()
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// Field-wise merge: whatever `other` sets replaces ours.
    pub fn merged(mut self, other: FixtureOverride) -> Self {
        if other.skip.is_some() {
            self.skip = other.skip;
        }
        if other.external_modules.is_some() {
            self.external_modules = other.external_modules;
        }
        if other.globals.is_some() {
            self.globals = other.globals;
        }
        if other.run.is_some() {
            self.run = other.run;
        }
        if other.script.is_some() {
            self.script = other.script;
        }
        self
    }
}

/// Overrides keyed by fixture path.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: BTreeMap<String, Arc<FixtureOverride>>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: FixtureOverride) {
        self.entries.insert(path.into(), Arc::new(entry));
    }

    pub fn get(&self, path: &str) -> Option<Arc<FixtureOverride>> {
        self.entries.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Layer `other` on top of this table, merging entries for the same path.
    pub fn merge(mut self, other: OverrideTable) -> Self {
        for (path, entry) in other.entries {
            let merged = match self.entries.remove(&path) {
                Some(base) => {
                    Arc::unwrap_or_clone(base).merged(Arc::unwrap_or_clone(entry))
                }
                None => Arc::unwrap_or_clone(entry),
            };
            self.entries.insert(path, Arc::new(merged));
        }
        self
    }

    /// Build a table from declarative config entries.
    pub fn from_specs(specs: &BTreeMap<String, FixtureSpec>) -> Self {
        let mut table = Self::new();
        for (path, spec) in specs {
            table.insert(path.clone(), spec.to_override());
        }
        table
    }

    /// Overrides for the rollup `chunking-form` samples.
    pub fn builtin() -> Self {
        const SHARED_BUNDLE: &str = "Missing shared bundle between ESM entries";
        let mut table = Self::new();

        table.insert(
            "chunking-form/samples/chunk-live-bindings",
            FixtureOverride::new()
                .with_skip(SHARED_BUNDLE)
                .with_script("(namespaces) => { new namespaces[0].default(); }"),
        );
        table.insert(
            "chunking-form/samples/aliasing-extensions",
            FixtureOverride::new().with_skip("incompatible"),
        );
        table.insert(
            "chunking-form/samples/avoid-chunk-import-hoisting",
            FixtureOverride::new().with_external_modules(
                ExternalModules::new().with("lib", |_| ModuleStub::new().value("default", 4i64)),
            ),
        );
        for path in [
            "chunking-form/samples/chunk-deshadowing-reassignment",
            "chunking-form/samples/chunk-execution-order",
            "chunking-form/samples/chunk-import-deshadowing",
            "chunking-form/samples/circular-entry-points",
        ] {
            table.insert(path, FixtureOverride::new().with_skip(SHARED_BUNDLE));
        }
        for path in [
            "chunking-form/samples/chunking-compact",
            "chunking-form/samples/chunking-externals",
        ] {
            table.insert(
                path,
                FixtureOverride::new().with_external_modules(ExternalModules::new().with(
                    "external",
                    |ctx| {
                        ModuleStub::new().function(ctx.console().logger("fn", vec!["external".into()]))
                    },
                )),
            );
        }
        table.insert(
            "chunking-form/samples/chunking-reexport",
            FixtureOverride::new()
                .with_skip(SHARED_BUNDLE)
                .with_external_modules(
                    ExternalModules::new().with("external", |_| ModuleStub::new().value("asdf", 1i64)),
                ),
        );
        table.insert(
            "chunking-form/samples/chunking-star-external",
            FixtureOverride::new()
                .with_skip("Assertion fails")
                .with_external_modules(
                    ExternalModules::new()
                        .with("external1", |_| ModuleStub::new().value("e", 2i64))
                        .with("external2", |_| ModuleStub::new().value("e", 4i64))
                        .with("starexternal1", |_| {
                            ModuleStub::new().value("a", 1i64).value("b", 2i64)
                        })
                        .with("starexternal2", |_| {
                            ModuleStub::new().value("c", 3i64).value("d", 4i64)
                        }),
                ),
        );
        table.insert(
            "chunking-form/samples/deconflict-globals",
            FixtureOverride::new()
                .with_globals(|| [("x".to_string(), Value::number(1.0))].into_iter().collect()),
        );
        table.insert(
            "chunking-form/samples/deduplicate-synthetic-named-exports-and-default",
            FixtureOverride::new().with_skip("incompatible"),
        );

        table
    }
}

/// Declarative override from `[fixtures."<path>"]` in the harness config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureSpec {
    pub skip: Option<String>,
    /// See [`FixtureOverride::with_script`].
    pub script: Option<String>,
    pub globals: Option<BTreeMap<String, serde_json::Value>>,
    pub external_modules: Option<BTreeMap<String, StubSpec>>,
}

/// Declarative stub module.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StubSpec {
    /// Plain value exports.
    pub exports: BTreeMap<String, serde_json::Value>,
    /// Function exports.
    pub functions: BTreeMap<String, FunctionSpec>,
}

/// Declarative stub function.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FunctionSpec {
    /// Arguments passed to `console.log` on every call.
    pub log: Option<Vec<serde_json::Value>>,
    pub returns: Option<serde_json::Value>,
}

impl FixtureSpec {
    pub fn to_override(&self) -> FixtureOverride {
        let mut entry = FixtureOverride::new();
        if let Some(reason) = &self.skip {
            entry = entry.with_skip(reason.clone());
        }
        if let Some(source) = &self.script {
            entry = entry.with_script(source.clone());
        }
        if let Some(globals) = self.globals.clone() {
            entry = entry.with_globals(move || {
                globals
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from(value.clone())))
                    .collect()
            });
        }
        if let Some(stubs) = &self.external_modules {
            let mut modules = ExternalModules::new();
            for (name, stub) in stubs {
                let stub = stub.clone();
                modules = modules.with(name.clone(), move |ctx| {
                    let mut module = ModuleStub::new();
                    for (export, value) in &stub.exports {
                        module = module.value(export.clone(), Value::from(value.clone()));
                    }
                    for (export, function) in &stub.functions {
                        let returns = function.returns.clone().map_or(Value::Undefined, Value::from);
                        let f = match &function.log {
                            Some(args) => ctx
                                .console()
                                .logger(export.clone(), args.iter().cloned().map(Value::from).collect())
                                .with_return(returns),
                            None => StubFunction::returning(export.clone(), returns),
                        };
                        module = module.function(f);
                    }
                    module
                });
            }
            entry = entry.with_external_modules(modules);
        }
        entry
    }
}
