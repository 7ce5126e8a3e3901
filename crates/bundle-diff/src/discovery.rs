//! Fixture discovery.
//!
//! Walks the fixture tree under `root/subdir`. A directory containing the
//! config file is a fixture; any other directory is a namespace and is
//! descended into. Children are visited in name order.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::DiscoveryError;
use crate::fixture::{ConfigReader, TestCase};
use crate::overrides::OverrideTable;

/// Where and how to look for fixtures.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub root: PathBuf,
    /// Directory under `root` the walk starts from.
    pub subdir: String,
    pub config_file: String,
    pub default_entry: String,
    /// Root-relative paths excluded with their whole subtree.
    pub exclude: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("../rollup/test"),
            subdir: "chunking-form/samples".to_string(),
            config_file: "_config.js".to_string(),
            default_entry: "main.js".to_string(),
            exclude: vec![
                "chunking-form/samples/chunk-naming".to_string(),
                "chunking-form/samples/deprecated".to_string(),
            ],
        }
    }
}

/// Result of a discovery walk.
#[derive(Debug, Default)]
pub struct Discovered {
    pub cases: Vec<TestCase>,
    /// Fixtures dropped before comparison because they expect a circular
    /// dependency warning.
    pub circular: Vec<String>,
}

/// Collect every fixture under the configured root, in name order.
pub fn discover(
    options: &DiscoveryOptions,
    reader: &dyn ConfigReader,
    overrides: &OverrideTable,
) -> Result<Discovered, DiscoveryError> {
    let start = options.root.join(&options.subdir);
    if !start.is_dir() {
        return Err(DiscoveryError::MissingRoot(start));
    }

    let mut discovered = Discovered::default();
    let mut walker = WalkDir::new(&start)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let id = relative_id(&options.root, entry.path());
        if options.exclude.iter().any(|excluded| *excluded == id) {
            tracing::debug!(fixture = %id, "excluded");
            walker.skip_current_dir();
            continue;
        }

        let config_path = entry.path().join(&options.config_file);
        if !config_path.is_file() {
            continue;
        }
        walker.skip_current_dir();

        let config = reader.read(&config_path)?;
        if config.expects_circular_dependency() {
            tracing::debug!(fixture = %id, "expects a circular dependency warning, not compared");
            discovered.circular.push(id);
            continue;
        }

        discovered.cases.push(TestCase {
            entries: config.entries(&options.default_entry),
            externals: config.externals(),
            overrides: overrides.get(&id),
            dir: entry.path().to_path_buf(),
            id,
        });
    }

    tracing::info!(
        cases = discovered.cases.len(),
        circular = discovered.circular.len(),
        root = %start.display(),
        "discovered fixtures"
    );
    Ok(discovered)
}

fn relative_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::JsonConfigReader;
    use crate::overrides::FixtureOverride;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(root: &Path, rel: &str, config: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("_config.json"), config).unwrap();
        fs::write(dir.join("main.js"), "export default 1;\n").unwrap();
    }

    fn options(root: &Path) -> DiscoveryOptions {
        DiscoveryOptions {
            root: root.to_path_buf(),
            subdir: "samples".to_string(),
            config_file: "_config.json".to_string(),
            default_entry: "main.js".to_string(),
            exclude: vec!["samples/skipped".to_string()],
        }
    }

    #[test]
    fn test_walks_namespaces_in_name_order() {
        let tmp = TempDir::new().unwrap();
        fixture(tmp.path(), "samples/zeta", "{}");
        fixture(tmp.path(), "samples/alpha", "{}");
        fixture(tmp.path(), "samples/group/inner", r#"{"options": {"input": ["a", "b"]}}"#);

        let found = discover(&options(tmp.path()), &JsonConfigReader, &OverrideTable::new()).unwrap();
        let ids: Vec<_> = found.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["samples/alpha", "samples/group/inner", "samples/zeta"]);
        assert_eq!(found.cases[1].entries, vec!["a.js", "b.js"]);
        assert_eq!(found.cases[1].dir, tmp.path().join("samples/group/inner"));
    }

    #[test]
    fn test_fixture_directories_are_not_descended() {
        let tmp = TempDir::new().unwrap();
        fixture(tmp.path(), "samples/outer", "{}");
        fixture(tmp.path(), "samples/outer/_expected", "{}");

        let found = discover(&options(tmp.path()), &JsonConfigReader, &OverrideTable::new()).unwrap();
        assert_eq!(found.cases.len(), 1);
        assert_eq!(found.cases[0].id, "samples/outer");
    }

    #[test]
    fn test_exclusions_and_circular_fixtures() {
        let tmp = TempDir::new().unwrap();
        fixture(tmp.path(), "samples/skipped/nested", "{}");
        fixture(
            tmp.path(),
            "samples/cycle",
            r#"{"expectedWarnings": ["CIRCULAR_DEPENDENCY"]}"#,
        );
        fixture(tmp.path(), "samples/kept", r#"{"options": {"external": ["lib"]}}"#);

        let found = discover(&options(tmp.path()), &JsonConfigReader, &OverrideTable::new()).unwrap();
        assert_eq!(found.cases.len(), 1);
        assert_eq!(found.cases[0].externals, vec!["lib"]);
        assert_eq!(found.circular, vec!["samples/cycle"]);
    }

    #[test]
    fn test_attaches_overrides_by_id() {
        let tmp = TempDir::new().unwrap();
        fixture(tmp.path(), "samples/a", "{}");
        let mut table = OverrideTable::new();
        table.insert("samples/a", FixtureOverride::new().with_skip("not today"));

        let found = discover(&options(tmp.path()), &JsonConfigReader, &table).unwrap();
        assert_eq!(found.cases[0].skip_reason(), Some("not today"));
    }

    #[test]
    fn test_malformed_config_aborts() {
        let tmp = TempDir::new().unwrap();
        fixture(tmp.path(), "samples/bad", "{ not json");
        let err = discover(&options(tmp.path()), &JsonConfigReader, &OverrideTable::new()).unwrap_err();
        assert!(matches!(err, DiscoveryError::MalformedConfig { .. }));
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        let err = discover(&options(tmp.path()), &JsonConfigReader, &OverrideTable::new()).unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingRoot(_)));
    }
}
