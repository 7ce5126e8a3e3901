//! Fixture configuration and test cases.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DiscoveryError;
use crate::overrides::FixtureOverride;

/// Warning tag that excludes a fixture from comparison.
pub const CIRCULAR_DEPENDENCY: &str = "CIRCULAR_DEPENDENCY";

/// The parts of a fixture's `_config` file the harness reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureConfig {
    #[serde(default)]
    pub options: Option<FixtureOptions>,
    #[serde(default)]
    pub expected_warnings: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FixtureOptions {
    #[serde(default)]
    pub input: Option<Names>,
    #[serde(default)]
    pub external: Option<Names>,
}

/// `options.input` and `options.external`: a single name or an ordered list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Names {
    One(String),
    Many(Vec<String>),
}

impl Names {
    fn to_vec(&self) -> Vec<String> {
        match self {
            Names::One(name) => vec![name.clone()],
            Names::Many(names) => names.clone(),
        }
    }
}

impl FixtureConfig {
    /// Parse the JSON form of a fixture config.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, DiscoveryError> {
        serde_json::from_str(text).map_err(|e| DiscoveryError::MalformedConfig {
            path: path.to_path_buf(),
            message: describe_json_error(&e, text),
        })
    }

    /// Entry file names, each with a `.js` suffix.
    pub fn entries(&self, default_entry: &str) -> Vec<String> {
        let names = match self.options.as_ref().and_then(|o| o.input.as_ref()) {
            Some(input) => input.to_vec(),
            None => vec![default_entry.to_string()],
        };
        names
            .into_iter()
            .map(|name| {
                if name.ends_with(".js") {
                    name
                } else {
                    format!("{}.js", name)
                }
            })
            .collect()
    }

    pub fn externals(&self) -> Vec<String> {
        self.options
            .as_ref()
            .and_then(|o| o.external.as_ref())
            .map(Names::to_vec)
            .unwrap_or_default()
    }

    pub fn expects_circular_dependency(&self) -> bool {
        self.expected_warnings
            .as_ref()
            .is_some_and(|warnings| warnings.iter().any(|w| w == CIRCULAR_DEPENDENCY))
    }
}

fn describe_json_error(err: &serde_json::Error, text: &str) -> String {
    if err.is_data() && err.to_string().contains("untagged") {
        let key = if text.contains("\"external\"") && !text.contains("\"input\"") {
            "external"
        } else {
            "input"
        };
        return format!(
            "options.{} must be a string or a list of strings ({})",
            key, err
        );
    }
    err.to_string()
}

/// Reads fixture configuration files.
pub trait ConfigReader {
    fn read(&self, path: &Path) -> Result<FixtureConfig, DiscoveryError>;
}

/// Reads `_config.json` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConfigReader;

impl ConfigReader for JsonConfigReader {
    fn read(&self, path: &Path) -> Result<FixtureConfig, DiscoveryError> {
        let text = std::fs::read_to_string(path).map_err(|e| DiscoveryError::MalformedConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        FixtureConfig::from_json(path, &text)
    }
}

/// One comparison test case.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Fixture path relative to the fixture root, `/`-separated.
    pub id: String,
    /// Absolute fixture directory.
    pub dir: PathBuf,
    /// Entry file names, in evaluation order.
    pub entries: Vec<String>,
    /// External module names required by the fixture config.
    pub externals: Vec<String>,
    pub overrides: Option<Arc<FixtureOverride>>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>, entries: Vec<String>) -> Self {
        Self {
            id: id.into(),
            dir: dir.into(),
            entries,
            externals: Vec::new(),
            overrides: None,
        }
    }

    pub fn with_externals(mut self, externals: Vec<String>) -> Self {
        self.externals = externals;
        self
    }

    pub fn with_overrides(mut self, overrides: FixtureOverride) -> Self {
        self.overrides = Some(Arc::new(overrides));
        self
    }

    pub fn overrides(&self) -> Option<&FixtureOverride> {
        self.overrides.as_deref()
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.overrides().and_then(FixtureOverride::skip_reason)
    }

    /// Namespace the case lives in (its parent path).
    pub fn group(&self) -> &str {
        self.id.rsplit_once('/').map_or("", |(group, _)| group)
    }
}
