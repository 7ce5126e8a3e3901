//! Bundling adapter.
//!
//! The bundler is a black box behind [`Bundler`]. [`CommandBundler`] drives
//! any bundler CLI through an argument template; the output is read back into
//! a [`BundleOutput`] and the scratch directory is removed before the bundled
//! run starts, so nothing from a bundle outlives its case on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::error::BundleError;

/// Module format of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Esmodule,
    Commonjs,
    Global,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Esmodule => write!(f, "esmodule"),
            OutputFormat::Commonjs => write!(f, "commonjs"),
            OutputFormat::Global => write!(f, "global"),
        }
    }
}

/// One bundler invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleRequest {
    /// Absolute entry paths, in order.
    pub entries: Vec<PathBuf>,
    pub output_format: OutputFormat,
    /// Module names left unresolved by the bundler.
    pub externals: Vec<String>,
}

/// Files produced by one bundler invocation, held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleOutput {
    dist_dir: PathBuf,
    files: BTreeMap<PathBuf, String>,
}

impl BundleOutput {
    pub fn new(dist_dir: PathBuf, files: BTreeMap<PathBuf, String>) -> Self {
        Self { dist_dir, files }
    }

    /// Directory every output path lives under.
    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &String)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A bundler with a process-wide worker farm.
///
/// The farm is started once before the first case and stopped once after the
/// last; every [`Bundler::bundle`] call borrows it.
#[allow(async_fn_in_trait)]
pub trait Bundler {
    type Farm;

    async fn start(&self) -> Result<Self::Farm, BundleError>;

    async fn bundle(
        &self,
        farm: &Self::Farm,
        request: &BundleRequest,
    ) -> Result<BundleOutput, BundleError>;

    async fn stop(&self, farm: Self::Farm) -> Result<(), BundleError>;
}

/// Command-line template for an external bundler.
///
/// Placeholders: `{entries}` (a whole argument, expanded to one argument per
/// entry), `{out_dir}`, `{format}`, `{target}`, and `{name}` inside
/// `external_args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Repeated once per external module name.
    pub external_args: Vec<String>,
    /// Target engine baseline.
    pub target: String,
    /// Bundler spelling of each output format tag.
    pub formats: BTreeMap<String, String>,
}

impl Default for BundlerCommand {
    fn default() -> Self {
        Self {
            program: "esbuild".to_string(),
            args: [
                "{entries}",
                "--bundle",
                "--splitting",
                "--format={format}",
                "--target={target}",
                "--outdir={out_dir}",
                "--define:process.env.NODE_ENV=\"production\"",
                "--log-level=error",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            external_args: vec!["--external:{name}".to_string()],
            target: "chrome80".to_string(),
            formats: [
                ("esmodule", "esm"),
                ("commonjs", "cjs"),
                ("global", "iife"),
            ]
            .into_iter()
            .map(|(tag, name)| (tag.to_string(), name.to_string()))
            .collect(),
        }
    }
}

impl BundlerCommand {
    /// Expand the template for `request`, writing into `out_dir`.
    pub fn expand(&self, request: &BundleRequest, out_dir: &Path) -> Vec<String> {
        let tag = request.output_format.to_string();
        let format = self.formats.get(&tag).cloned().unwrap_or(tag);
        let out_dir = out_dir.to_string_lossy();

        let mut args = Vec::with_capacity(self.args.len() + request.entries.len());
        for arg in &self.args {
            if arg == "{entries}" {
                args.extend(
                    request
                        .entries
                        .iter()
                        .map(|entry| entry.to_string_lossy().to_string()),
                );
                continue;
            }
            args.push(
                arg.replace("{out_dir}", &out_dir)
                    .replace("{format}", &format)
                    .replace("{target}", &self.target),
            );
        }
        for name in &request.externals {
            for arg in &self.external_args {
                args.push(arg.replace("{name}", name));
            }
        }
        args
    }
}

/// Bundler driven through a command-line template.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    command: BundlerCommand,
    dist_dir: PathBuf,
}

/// Scratch space shared by all invocations of one run.
#[derive(Debug)]
pub struct CommandFarm {
    program: PathBuf,
    scratch: TempDir,
    invocations: AtomicUsize,
}

impl CommandFarm {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl CommandBundler {
    /// `dist_dir` is the virtual directory bundle files are keyed under.
    pub fn new(command: BundlerCommand, dist_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            dist_dir: dist_dir.into(),
        }
    }
}

impl Bundler for CommandBundler {
    type Farm = CommandFarm;

    async fn start(&self) -> Result<CommandFarm, BundleError> {
        let program = which::which(&self.command.program).map_err(|e| {
            BundleError::Other(format!(
                "bundler `{}` not found: {}",
                self.command.program, e
            ))
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("bundle-diff-")
            .tempdir()?;
        tracing::info!(
            program = %program.display(),
            scratch = %scratch.path().display(),
            "bundler farm started"
        );
        Ok(CommandFarm {
            program,
            scratch,
            invocations: AtomicUsize::new(0),
        })
    }

    async fn bundle(
        &self,
        farm: &CommandFarm,
        request: &BundleRequest,
    ) -> Result<BundleOutput, BundleError> {
        let seq = farm.invocations.fetch_add(1, Ordering::Relaxed);
        let out_dir = tempfile::Builder::new()
            .prefix(&format!("run-{}-", seq))
            .tempdir_in(farm.scratch.path())?;
        let args = self.command.expand(request, out_dir.path());
        tracing::debug!(program = %farm.program.display(), ?args, "invoking bundler");

        let output = Command::new(&farm.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| BundleError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(BundleError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let files = read_output(out_dir.path(), &self.dist_dir)?;
        out_dir.close()?;
        tracing::debug!(files = files.len(), "bundle read into memory");
        Ok(BundleOutput::new(self.dist_dir.clone(), files))
    }

    async fn stop(&self, farm: CommandFarm) -> Result<(), BundleError> {
        let invocations = farm.invocations();
        farm.scratch.close()?;
        tracing::info!(invocations, "bundler farm stopped");
        Ok(())
    }
}

/// Read every non-sourcemap file under `out_dir`, re-keyed under `dist_dir`.
fn read_output(out_dir: &Path, dist_dir: &Path) -> Result<BTreeMap<PathBuf, String>, BundleError> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(out_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BundleError::Other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "map") {
            continue;
        }
        let relative = path.strip_prefix(out_dir).unwrap_or(path);
        files.insert(dist_dir.join(relative), std::fs::read_to_string(path)?);
    }
    Ok(files)
}
