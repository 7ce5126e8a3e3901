//! Comparison of a run against a saved baseline report.

use colored::*;
use std::collections::HashMap;

use crate::report::PersistedReport;
use crate::runner::TestOutcome;

/// Outcome changes between a baseline and a new run.
#[derive(Debug, Default)]
pub struct RunComparison {
    /// Fail -> Pass.
    pub fixed: Vec<String>,
    /// Pass -> Fail.
    pub broken: Vec<String>,
    /// Fixtures absent from the baseline.
    pub added: Vec<String>,
    pub pass_delta: i64,
    pub fail_delta: i64,
}

impl RunComparison {
    pub fn compare(base: &PersistedReport, new: &PersistedReport) -> Self {
        let base_results: HashMap<&str, TestOutcome> = base
            .results
            .iter()
            .map(|r| (r.path.as_str(), r.outcome))
            .collect();

        let mut comparison = RunComparison {
            pass_delta: new.summary.passed as i64 - base.summary.passed as i64,
            fail_delta: new.summary.failed as i64 - base.summary.failed as i64,
            ..Default::default()
        };

        for result in &new.results {
            match (base_results.get(result.path.as_str()), result.outcome) {
                (None, _) => comparison.added.push(result.path.clone()),
                (Some(TestOutcome::Fail), TestOutcome::Pass) => {
                    comparison.fixed.push(result.path.clone())
                }
                (Some(TestOutcome::Pass), TestOutcome::Fail) => {
                    comparison.broken.push(result.path.clone())
                }
                _ => {}
            }
        }

        comparison.fixed.sort();
        comparison.broken.sort();
        comparison.added.sort();
        comparison
    }

    pub fn print(&self) {
        println!();
        println!("{}", "=== Baseline Comparison ===".bold().cyan());

        let delta = if self.pass_delta >= 0 {
            format!("+{}", self.pass_delta).green()
        } else {
            format!("{}", self.pass_delta).red()
        };
        println!("Pass delta: {}", delta);

        if !self.fixed.is_empty() {
            println!("{} ({}):", "Fixed".green().bold(), self.fixed.len());
            for path in &self.fixed {
                println!("  {} {}", "+".green(), path);
            }
        }
        if !self.broken.is_empty() {
            println!("{} ({}):", "Regressions".red().bold(), self.broken.len());
            for path in &self.broken {
                println!("  {} {}", "-".red(), path);
            }
        }
        if !self.added.is_empty() {
            println!("New fixtures: {}", self.added.len());
        }
        if self.fixed.is_empty() && self.broken.is_empty() {
            println!("{}", "No changes detected.".dimmed());
        }
    }

    pub fn has_regressions(&self) -> bool {
        !self.broken.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TestResult;

    fn report(outcomes: &[(&str, TestOutcome)]) -> PersistedReport {
        let results = outcomes
            .iter()
            .map(|(path, outcome)| TestResult {
                path: path.to_string(),
                group: String::new(),
                outcome: *outcome,
                duration_ms: 0,
                error: None,
            })
            .collect();
        PersistedReport::new(results, 0.0)
    }

    #[test]
    fn test_fixed_broken_added() {
        let base = report(&[("a", TestOutcome::Fail), ("b", TestOutcome::Pass), ("c", TestOutcome::Skip)]);
        let new = report(&[
            ("a", TestOutcome::Pass),
            ("b", TestOutcome::Fail),
            ("c", TestOutcome::Pass),
            ("d", TestOutcome::Pass),
        ]);
        let cmp = RunComparison::compare(&base, &new);
        assert_eq!(cmp.fixed, vec!["a"]);
        assert_eq!(cmp.broken, vec!["b"]);
        assert_eq!(cmp.added, vec!["d"]);
        assert_eq!(cmp.pass_delta, 2);
        assert!(cmp.has_regressions());
    }
}
