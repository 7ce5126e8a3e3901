//! Sequential run over discovered cases.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use crate::bundler::{Bundler, OutputFormat};
use crate::error::{HarnessError, RunError};
use crate::fixture::TestCase;
use crate::loader::ModuleLoader;
use crate::verdict::{Comparator, Verdict, panic_message};

/// Outcome of a single case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    Pass,
    Fail,
    Skip,
}

/// Persisted result of a single case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Fixture id, relative to the fixture root.
    pub path: String,
    /// Namespace the fixture lives in.
    pub group: String,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
    /// Failure message or skip reason.
    pub error: Option<String>,
}

impl TestResult {
    pub fn new(case: &TestCase, verdict: &Verdict, duration_ms: u64) -> Self {
        let (outcome, error) = match verdict {
            Verdict::Pass => (TestOutcome::Pass, None),
            Verdict::Fail(failure) => (TestOutcome::Fail, Some(failure.error.to_string())),
            Verdict::Skip(reason) => (TestOutcome::Skip, Some(reason.clone())),
        };
        Self {
            path: case.id.clone(),
            group: case.group().to_string(),
            outcome,
            duration_ms,
            error,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<TestResult>,
    /// Case the run stopped at under `--bail`.
    pub bailed_on: Option<String>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.outcome == TestOutcome::Fail)
    }
}

/// Drives cases one after another through a [`Comparator`].
pub struct Runner<B: Bundler, L: ModuleLoader> {
    bundler: B,
    loader: L,
    output_format: OutputFormat,
    bail: bool,
}

impl<B: Bundler, L: ModuleLoader> Runner<B, L> {
    pub fn new(bundler: B, loader: L) -> Self {
        Self {
            bundler,
            loader,
            output_format: OutputFormat::default(),
            bail: false,
        }
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Stop at the first failing case.
    pub fn with_bail(mut self, bail: bool) -> Self {
        self.bail = bail;
        self
    }

    pub fn bundler(&self) -> &B {
        &self.bundler
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Run every case, calling `on_verdict` as each one completes.
    ///
    /// The bundler farm is started once before the first case and stopped
    /// once after the last, including when the run bails.
    pub async fn run<F>(&self, cases: &[TestCase], mut on_verdict: F) -> Result<RunSummary, RunError>
    where
        F: FnMut(&TestCase, &Verdict),
    {
        let farm = self.bundler.start().await?;
        let comparator = Comparator::new(&self.bundler, &farm, &self.loader, self.output_format);
        let mut summary = RunSummary::default();

        for case in cases {
            let start = Instant::now();
            let verdict = match AssertUnwindSafe(comparator.run(case)).catch_unwind().await {
                Ok(verdict) => verdict,
                Err(panic) => Verdict::fail(HarnessError::Panic(panic_message(&*panic)), None),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            on_verdict(case, &verdict);
            summary.results.push(TestResult::new(case, &verdict, duration_ms));

            if self.bail && verdict.is_fail() {
                tracing::info!(case = %case.id, "bailing after first failure");
                summary.bailed_on = Some(case.id.clone());
                break;
            }
        }

        if let Err(e) = self.bundler.stop(farm).await {
            tracing::warn!(error = %e, "failed to stop bundler farm");
        }
        Ok(summary)
    }
}
