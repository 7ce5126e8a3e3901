//! # bundle-diff
//!
//! Differential tester for JavaScript bundlers. Each fixture's entry
//! modules are evaluated as-is and again after bundling; the console output
//! and exports of both runs must be deep-equal.

#![warn(clippy::all)]

pub mod bundler;
pub mod compare;
pub mod config;
pub mod discovery;
pub mod env;
pub mod error;
pub mod fixture;
pub mod loader;
pub mod node;
pub mod overrides;
pub mod report;
pub mod runner;
pub mod stubs;
pub mod value;
pub mod verdict;

pub use bundler::{BundleOutput, BundleRequest, Bundler, CommandBundler, OutputFormat};
pub use config::HarnessConfig;
pub use env::{ConsoleSink, Environment};
pub use error::{HarnessError, RunError, Side};
pub use fixture::{ConfigReader, TestCase};
pub use loader::{ExecutionResult, ModuleExports, ModuleLoader};
pub use node::NodeLoader;
pub use overrides::{FixtureOverride, OverrideTable};
pub use report::{PersistedReport, TestReport};
pub use runner::{RunSummary, Runner, TestOutcome, TestResult};
pub use value::Value;
pub use verdict::{Comparator, Verdict};
