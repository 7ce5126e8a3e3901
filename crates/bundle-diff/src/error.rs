//! Error types for bundle-diff

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which half of a comparison an execution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Native,
    Bundled,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Native => write!(f, "native"),
            Side::Bundled => write!(f, "bundled"),
        }
    }
}

/// Declared external-module factories do not match the fixture's external names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing definition for externals (missing: [{}], extra: [{}])", .missing.join(", "), .extra.join(", "))]
pub struct ConfigurationError {
    /// Required by the fixture but without a factory.
    pub missing: Vec<String>,
    /// Has a factory but the fixture does not declare it external.
    pub extra: Vec<String>,
}

/// The external bundler failed.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("failed to spawn bundler `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bundler exited with {status}:\n{stderr}")]
    Failed { status: String, stderr: String },

    #[error("bundler output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Module evaluation (or a fixture's own assertion) failed.
#[derive(Error, Debug, Clone)]
#[error("{side} execution failed{}: {message}", .entry.as_ref().map(|e| format!(" in {}", e.display())).unwrap_or_default())]
pub struct ExecutionError {
    pub side: Side,
    /// Entry that was being evaluated, if known.
    pub entry: Option<PathBuf>,
    pub message: String,
}

impl ExecutionError {
    pub fn new(side: Side, message: impl Into<String>) -> Self {
        Self {
            side,
            entry: None,
            message: message.into(),
        }
    }

    pub fn in_entry(side: Side, entry: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            side,
            entry: Some(entry.into()),
            message: message.into(),
        }
    }
}

/// Which observable diverged between the two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchPart {
    Console,
    Exports,
}

impl fmt::Display for MismatchPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchPart::Console => write!(f, "console output"),
            MismatchPart::Exports => write!(f, "exports"),
        }
    }
}

/// Both runs completed but their observable effects differ.
#[derive(Error, Debug, Clone)]
#[error("{part} differ at {path}\n  expected (native):  {expected}\n  actual (bundled):   {actual}")]
pub struct ComparisonMismatch {
    pub part: MismatchPart,
    /// Path of the first divergence.
    pub path: String,
    pub expected: String,
    pub actual: String,
    /// Full rendering of the native side.
    pub native: String,
    /// Full rendering of the bundled side.
    pub bundled: String,
}

/// Anything that turns a single case into a failure.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Mismatch(#[from] ComparisonMismatch),

    #[error("harness panicked: {0}")]
    Panic(String),
}

/// Fixture discovery failed. Aborts the whole run.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to walk fixture tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("malformed fixture config '{}': {message}", .path.display())]
    MalformedConfig { path: PathBuf, message: String },

    #[error("fixture root '{}' does not exist", .0.display())]
    MissingRoot(PathBuf),
}

/// Harness configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Orchestration-level failure.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("bundler farm: {0}")]
    Farm(#[from] BundleError),

    #[error("node runtime unavailable: {0}")]
    Node(String),
}
