//! Harness configuration (from `bundle_diff.toml`).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bundler::{BundlerCommand, OutputFormat};
use crate::discovery::DiscoveryOptions;
use crate::error::ConfigError;
use crate::node::NodeConfig;
use crate::overrides::{FixtureSpec, OverrideTable};

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "bundle_diff.toml";

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "BUNDLE_DIFF_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root of the fixture tree; fixture ids are relative to it.
    pub fixture_root: PathBuf,
    /// Directory under the root the walk starts from.
    pub subdir: String,
    pub config_file: String,
    pub default_entry: String,
    /// Root-relative fixture paths excluded with their subtree.
    pub exclude: Vec<String>,
    pub output_format: OutputFormat,
    /// Virtual directory bundle files are served from.
    pub dist_dir: PathBuf,
    pub node: NodeConfig,
    pub bundler: BundlerCommand,
    /// Write a JSON report here after the run.
    pub save: Option<PathBuf>,
    /// Compare against this saved report.
    pub baseline: Option<PathBuf>,
    /// Declarative per-fixture overrides, merged over the built-in table.
    pub fixtures: BTreeMap<String, FixtureSpec>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let discovery = DiscoveryOptions::default();
        Self {
            fixture_root: discovery.root,
            subdir: discovery.subdir,
            config_file: discovery.config_file,
            default_entry: discovery.default_entry,
            exclude: discovery.exclude,
            output_format: OutputFormat::Esmodule,
            dist_dir: PathBuf::from("dist"),
            node: NodeConfig::default(),
            bundler: BundlerCommand::default(),
            save: None,
            baseline: None,
            fixtures: BTreeMap::new(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `$BUNDLE_DIFF_CONFIG`, else `bundle_diff.toml` if present,
    /// else defaults. A file that exists but fails to parse is an error.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load(default_path);
        }
        tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_PATH);
        Ok(Self::default())
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            root: absolute(&self.fixture_root),
            subdir: self.subdir.clone(),
            config_file: self.config_file.clone(),
            default_entry: self.default_entry.clone(),
            exclude: self.exclude.clone(),
        }
    }

    /// Absolute virtual output directory.
    pub fn dist_dir(&self) -> PathBuf {
        absolute(&self.dist_dir)
    }

    /// Built-in overrides with the config's `[fixtures]` entries merged over.
    pub fn overrides(&self) -> OverrideTable {
        OverrideTable::builtin().merge(OverrideTable::from_specs(&self.fixtures))
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    path.canonicalize()
        .or_else(|_| std::env::current_dir().map(|cwd| cwd.join(path)))
        .unwrap_or_else(|_| path.to_path_buf())
}
