//! Node-backed [`ModuleLoader`] and fixture config reader.
//!
//! Every evaluation spawns a fresh `node` process, so realms are never
//! shared between the two runs of a case or between cases. The process runs
//! an embedded driver that registers module hooks for external stubs and the
//! in-memory output directory, then imports the entries in order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::bundler::OutputFormat;
use crate::env::{ConsoleCall, Environment, GlobalBinding};
use crate::error::{DiscoveryError, ExecutionError, RunError, Side};
use crate::fixture::{ConfigReader, FixtureConfig};
use crate::loader::{ModuleExports, ModuleLoader};
use crate::stubs::StubExport;
use crate::value::{Bindings, Value};

const DRIVER: &str = include_str!("js/driver.mjs");
const HOOKS: &str = include_str!("js/hooks.mjs");
const READ_CONFIG: &str = include_str!("js/read_config.cjs");

/// Prefix of the driver's result line on stdout.
const RESULT_MARKER: &str = "@@bundle-diff-result@@";

/// Oldest Node with `module.register` and hook `initialize`.
pub const MIN_NODE_VERSION: (u32, u32) = (20, 6);

/// `[node]` section of the harness config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub program: String,
    /// Extra arguments placed before the driver flags.
    pub args: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: Vec::new(),
        }
    }
}

/// Locate a usable `node` binary.
pub fn find_node(config: &NodeConfig) -> Result<PathBuf, RunError> {
    let program = which::which(&config.program)
        .map_err(|e| RunError::Node(format!("`{}` not found: {}", config.program, e)))?;
    let output = std::process::Command::new(&program)
        .arg("--version")
        .output()
        .map_err(|e| RunError::Node(format!("failed to run `{}`: {}", program.display(), e)))?;
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    match parse_version(&version) {
        Some(found) if found >= MIN_NODE_VERSION => {
            tracing::debug!(program = %program.display(), %version, "using node");
            Ok(program)
        }
        _ => Err(RunError::Node(format!(
            "{} reports version '{}', need >= {}.{}",
            program.display(),
            version,
            MIN_NODE_VERSION.0,
            MIN_NODE_VERSION.1
        ))),
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().trim_start_matches('v').split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Evaluates modules in a child `node` process.
#[derive(Debug, Clone)]
pub struct NodeLoader {
    program: PathBuf,
    args: Vec<String>,
    format: OutputFormat,
}

impl NodeLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            format: OutputFormat::Esmodule,
        }
    }

    /// Find `node` per `config` and build a loader for it.
    pub fn locate(config: &NodeConfig) -> Result<Self, RunError> {
        Ok(Self::new(find_node(config)?).with_args(config.args.clone()))
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Module format in-memory output files are loaded as.
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum GlobalWire<'a> {
    Console,
    Assert,
    Value { value: &'a Value },
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum StubExportWire<'a> {
    Value {
        value: &'a Value,
    },
    Function {
        name: &'a str,
        logs: Option<&'a [Value]>,
        returns: &'a Value,
    },
}

#[derive(Serialize)]
struct DriverRequest<'a> {
    hooks: &'static str,
    entries: Vec<String>,
    globals: BTreeMap<&'a str, GlobalWire<'a>>,
    externals: BTreeMap<&'a str, BTreeMap<&'a str, StubExportWire<'a>>>,
    files: BTreeMap<String, &'a str>,
    format: &'static str,
    script: Option<&'a str>,
}

impl<'a> DriverRequest<'a> {
    fn new(entries: &[PathBuf], env: &'a Environment, format: OutputFormat) -> Self {
        let globals = env
            .globals()
            .iter()
            .map(|(name, binding)| {
                let wire = match binding {
                    GlobalBinding::Console => GlobalWire::Console,
                    GlobalBinding::Assert => GlobalWire::Assert,
                    GlobalBinding::Value(value) => GlobalWire::Value { value },
                };
                (name.as_str(), wire)
            })
            .collect();

        let externals = env
            .externals()
            .iter()
            .map(|(name, stub)| {
                let exports = stub
                    .exports()
                    .map(|(export, item)| {
                        let wire = match item {
                            StubExport::Value(value) => StubExportWire::Value { value },
                            StubExport::Function(f) => StubExportWire::Function {
                                name: f.name(),
                                logs: f.logs(),
                                returns: f.returns(),
                            },
                        };
                        (export.as_str(), wire)
                    })
                    .collect();
                (name.as_str(), exports)
            })
            .collect();

        let files = env
            .file_override()
            .map(|bundle| {
                bundle
                    .files()
                    .map(|(path, source)| (path.to_string_lossy().into_owned(), source.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            hooks: HOOKS,
            entries: entries
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            globals,
            externals,
            files,
            format: match format {
                OutputFormat::Esmodule => "module",
                OutputFormat::Commonjs | OutputFormat::Global => "commonjs",
            },
            script: env.script(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    console: Vec<ConsoleCall>,
    exports: Vec<DriverExports>,
    error: Option<DriverError>,
}

#[derive(Debug, Deserialize)]
struct DriverExports {
    entry: PathBuf,
    bindings: Bindings,
}

#[derive(Debug, Deserialize)]
struct DriverError {
    entry: Option<PathBuf>,
    message: String,
}

fn parse_response(side: Side, stdout: &str, stderr: &str, status: &str) -> Result<DriverResponse, ExecutionError> {
    let Some(line) = stdout.lines().rev().find_map(|l| l.strip_prefix(RESULT_MARKER)) else {
        return Err(ExecutionError::new(
            side,
            format!("node exited with {} before reporting a result\n{}", status, stderr.trim()),
        ));
    };
    serde_json::from_str(line)
        .map_err(|e| ExecutionError::new(side, format!("unreadable driver result: {}", e)))
}

impl ModuleLoader for NodeLoader {
    async fn evaluate(
        &self,
        entries: &[PathBuf],
        env: &Environment,
    ) -> Result<Vec<ModuleExports>, ExecutionError> {
        let side = env.side();
        let request = DriverRequest::new(entries, env, self.format);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ExecutionError::new(side, format!("failed to encode request: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(["--no-warnings", "--input-type=module", "--eval", DRIVER])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::new(side, format!("failed to spawn {}: {}", self.program.display(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| ExecutionError::new(side, format!("failed to send request: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecutionError::new(side, format!("node did not finish: {}", e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let response = parse_response(side, &stdout, &stderr, &output.status.to_string())?;
        tracing::debug!(
            %side,
            console = response.console.len(),
            modules = response.exports.len(),
            "node evaluation finished"
        );

        env.console().extend(response.console);
        if let Some(error) = response.error {
            return Err(ExecutionError {
                side,
                entry: error.entry,
                message: error.message,
            });
        }

        Ok(response
            .exports
            .into_iter()
            .map(|e| ModuleExports {
                entry: e.entry,
                bindings: e.bindings,
            })
            .collect())
    }
}

/// Reads `_config.js` fixture configs by requiring them in `node`.
/// `.json` configs are parsed directly.
#[derive(Debug, Clone)]
pub struct NodeConfigReader {
    program: PathBuf,
}

impl NodeConfigReader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ConfigReader for NodeConfigReader {
    fn read(&self, path: &Path) -> Result<FixtureConfig, DiscoveryError> {
        let malformed = |message: String| DiscoveryError::MalformedConfig {
            path: path.to_path_buf(),
            message,
        };

        if path.extension().is_some_and(|ext| ext == "json") {
            let text = std::fs::read_to_string(path).map_err(|e| malformed(e.to_string()))?;
            return FixtureConfig::from_json(path, &text);
        }

        let output = std::process::Command::new(&self.program)
            .arg("--eval")
            .arg(READ_CONFIG)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| malformed(format!("failed to run node: {}", e)))?;
        if !output.status.success() {
            return Err(malformed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        FixtureConfig::from_json(path, &String::from_utf8_lossy(&output.stdout))
    }
}
