//! Per-case verdict engine.
//!
//! For one test case: check the external stubs, run the raw fixture, bundle
//! it, run the bundle, then compare console output and exports. The first
//! failing step decides the verdict.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::bundler::{BundleOutput, BundleRequest, Bundler, OutputFormat};
use crate::env::Environment;
use crate::error::{ComparisonMismatch, ExecutionError, HarnessError, MismatchPart, Side};
use crate::fixture::TestCase;
use crate::loader::{EntryExports, ExecutionResult, ModuleLoader, entry_paths};
use crate::overrides::FixtureOverride;
use crate::stubs;
use crate::value::{Value, first_divergence};

/// Outcome of one case.
#[derive(Debug)]
pub enum Verdict {
    Pass,
    Fail(Failure),
    Skip(String),
}

/// Why a case failed, with the bundle when one was produced.
#[derive(Debug)]
pub struct Failure {
    pub error: HarnessError,
    pub bundle: Option<Arc<BundleOutput>>,
}

impl Verdict {
    pub fn fail(error: impl Into<HarnessError>, bundle: Option<Arc<BundleOutput>>) -> Self {
        Verdict::Fail(Failure {
            error: error.into(),
            bundle,
        })
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Verdict::Fail(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Runs cases against one bundler farm and one loader.
pub struct Comparator<'a, B: Bundler, L: ModuleLoader> {
    bundler: &'a B,
    farm: &'a B::Farm,
    loader: &'a L,
    output_format: OutputFormat,
}

impl<'a, B: Bundler, L: ModuleLoader> Comparator<'a, B, L> {
    pub fn new(bundler: &'a B, farm: &'a B::Farm, loader: &'a L, output_format: OutputFormat) -> Self {
        Self {
            bundler,
            farm,
            loader,
            output_format,
        }
    }

    /// Decide the verdict for `case`. Skipped cases touch neither the
    /// bundler nor the loader; a configuration error fails before either.
    pub async fn run(&self, case: &TestCase) -> Verdict {
        if let Some(reason) = case.skip_reason() {
            return Verdict::Skip(reason.to_string());
        }

        let overrides = case.overrides();
        let declared = overrides.and_then(FixtureOverride::external_modules);
        if let Err(e) = stubs::validate(&case.externals, declared) {
            return Verdict::fail(e, None);
        }

        let native = match self.execute(case, Environment::native(overrides), &case.dir).await {
            Ok(result) => result,
            Err(e) => return Verdict::fail(e, None),
        };

        let request = BundleRequest {
            entries: entry_paths(&case.dir, &case.entries),
            output_format: self.output_format,
            externals: declared.map(|m| m.names()).unwrap_or_default(),
        };
        let bundle = match self.bundler.bundle(self.farm, &request).await {
            Ok(output) => Arc::new(output),
            Err(e) => return Verdict::fail(e, None),
        };
        tracing::debug!(case = %case.id, files = bundle.len(), "bundled");

        let env = Environment::bundled(overrides, Arc::clone(&bundle));
        let bundled = match self.execute(case, env, bundle.dist_dir()).await {
            Ok(result) => result,
            Err(e) => return Verdict::fail(e, Some(bundle)),
        };

        match compare(&native, &bundled) {
            Ok(()) => Verdict::Pass,
            Err(mismatch) => Verdict::fail(mismatch, Some(bundle)),
        }
    }

    async fn execute(
        &self,
        case: &TestCase,
        env: Environment,
        dir: &std::path::Path,
    ) -> Result<ExecutionResult, ExecutionError> {
        let entries = entry_paths(dir, &case.entries);
        let modules = self.loader.evaluate(&entries, &env).await?;
        let result = ExecutionResult::collect(&env, &case.entries, modules)?;
        inspect(env.side(), case.overrides(), &result.exports)?;
        Ok(result)
    }
}

/// Run the fixture's inspection callback, if any, on one side's exports.
fn inspect(
    side: Side,
    overrides: Option<&FixtureOverride>,
    exports: &EntryExports,
) -> Result<(), ExecutionError> {
    let Some(inspector) = overrides.and_then(FixtureOverride::inspector) else {
        return Ok(());
    };
    match catch_unwind(AssertUnwindSafe(|| inspector(exports))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(message)) => Err(ExecutionError::new(
            side,
            format!("inspection failed: {}", message),
        )),
        Err(panic) => Err(ExecutionError::new(
            side,
            format!("inspection panicked: {}", panic_message(&*panic)),
        )),
    }
}

/// Compare console output first, then exports.
pub fn compare(native: &ExecutionResult, bundled: &ExecutionResult) -> Result<(), ComparisonMismatch> {
    check(
        MismatchPart::Console,
        "console",
        native.console_value(),
        bundled.console_value(),
    )?;
    check(
        MismatchPart::Exports,
        "exports",
        native.exports_value(),
        bundled.exports_value(),
    )
}

fn check(part: MismatchPart, root: &str, native: Value, bundled: Value) -> Result<(), ComparisonMismatch> {
    match first_divergence(root, &native, &bundled) {
        None => Ok(()),
        Some(divergence) => Err(ComparisonMismatch {
            part,
            path: divergence.path,
            expected: divergence.expected,
            actual: divergence.actual,
            native: native.to_string(),
            bundled: bundled.to_string(),
        }),
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
