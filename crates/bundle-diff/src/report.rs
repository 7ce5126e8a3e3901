//! Per-case output lines and the end-of-run report.

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::runner::{TestOutcome, TestResult};
use crate::verdict::Verdict;

/// Print the line(s) for one finished case.
///
/// Failures are followed by the error and, when a bundle was produced, every
/// bundle file as a `--------- name ---------` header plus its contents.
pub fn print_verdict(id: &str, verdict: &Verdict) {
    match verdict {
        Verdict::Skip(reason) => println!("{}", format!("Skip: {} ({})", id, reason).yellow()),
        Verdict::Pass => println!("{}", format!("Pass: {}", id).green()),
        Verdict::Fail(failure) => {
            println!("{}", format!("Fail: {}", id).red());
            eprintln!("{}", failure.error);
            if let Some(bundle) = &failure.bundle {
                for (path, source) in bundle.files() {
                    let name = path.strip_prefix(bundle.dist_dir()).unwrap_or(path);
                    eprintln!("--------- {} ---------", name.display());
                    eprintln!("{}", source);
                }
            }
        }
    }
}

/// Aggregated run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pass_rate: f64,
    /// Results grouped by fixture namespace.
    pub by_group: BTreeMap<String, GroupReport>,
    /// First N failure details.
    pub failures: Vec<FailureInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl GroupReport {
    pub fn pass_rate(&self) -> f64 {
        let run = self.passed + self.failed;
        if run > 0 {
            (self.passed as f64 / run as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub path: String,
    pub error: String,
}

const MAX_RECORDED_FAILURES: usize = 200;

impl TestReport {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut report = Self {
            total: results.len(),
            passed: 0,
            failed: 0,
            skipped: 0,
            pass_rate: 0.0,
            by_group: BTreeMap::new(),
            failures: Vec::new(),
        };

        for result in results {
            let group = report.by_group.entry(result.group.clone()).or_default();
            group.total += 1;
            match result.outcome {
                TestOutcome::Pass => {
                    report.passed += 1;
                    group.passed += 1;
                }
                TestOutcome::Fail => {
                    report.failed += 1;
                    group.failed += 1;
                    if report.failures.len() < MAX_RECORDED_FAILURES {
                        report.failures.push(FailureInfo {
                            path: result.path.clone(),
                            error: result.error.clone().unwrap_or_default(),
                        });
                    }
                }
                TestOutcome::Skip => {
                    report.skipped += 1;
                    group.skipped += 1;
                }
            }
        }

        let run = report.passed + report.failed;
        if run > 0 {
            report.pass_rate = (report.passed as f64 / run as f64) * 100.0;
        }
        report
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", "=== Bundle Diff Results ===".bold().cyan());
        println!("Total:   {}", self.total);
        println!(
            "Passed:  {} ({:.1}%)",
            self.passed.to_string().green(),
            self.pass_rate
        );
        println!("Failed:  {}", self.failed.to_string().red());
        println!("Skipped: {}", self.skipped.to_string().yellow());

        if self.by_group.len() > 1 {
            println!();
            println!("{}", "=== By Group ===".bold().cyan());
            for (group, gr) in &self.by_group {
                let rate = format!("{:.1}%", gr.pass_rate());
                let rate = if gr.failed == 0 { rate.green() } else { rate.red() };
                println!(
                    "  {:<40} {}/{} ({})",
                    group,
                    gr.passed.to_string().green(),
                    gr.total,
                    rate
                );
            }
        }
    }
}

/// Report saved to disk for comparison between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedReport {
    pub timestamp: String,
    pub version: String,
    pub duration_secs: f64,
    pub summary: TestReport,
    pub results: Vec<TestResult>,
}

impl PersistedReport {
    pub fn new(results: Vec<TestResult>, duration_secs: f64) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            duration_secs,
            summary: TestReport::from_results(&results),
            results,
        }
    }

    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
