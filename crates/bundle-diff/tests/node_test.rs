//! Tests against a real `node` binary. Skipped when node is missing or
//! older than 20.6.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bundle_diff::bundler::{BundleOutput, BundlerCommand, CommandBundler};
use bundle_diff::env::Environment;
use bundle_diff::error::{DiscoveryError, Side};
use bundle_diff::fixture::{ConfigReader, TestCase};
use bundle_diff::loader::ModuleLoader;
use bundle_diff::node::{NodeConfig, NodeConfigReader, NodeLoader};
use bundle_diff::overrides::FixtureOverride;
use bundle_diff::runner::{Runner, TestOutcome};
use bundle_diff::stubs::{ExternalModules, ModuleStub};
use bundle_diff::value::Value;
use tempfile::TempDir;

fn node() -> Option<NodeLoader> {
    match NodeLoader::locate(&NodeConfig::default()) {
        Ok(loader) => Some(loader),
        Err(e) => {
            eprintln!("skipping: {}", e);
            None
        }
    }
}

fn write(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, source).unwrap();
    path
}

#[tokio::test]
async fn test_exports_and_console() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let main = write(
        tmp.path(),
        "main.js",
        r#"
import { helper } from './dep.js';
console.log('hello', 1, [true, null], { a: undefined });
export const n = helper(2);
export const big = 10n;
export default class Widget {}
export const nan = NaN;
"#,
    );
    write(tmp.path(), "dep.js", "export const helper = (x) => x * 21;\n");

    let env = Environment::native(None);
    let modules = node.evaluate(&[main.clone()], &env).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].entry, main);

    let bindings = &modules[0].bindings;
    assert_eq!(bindings["n"], Value::number(42.0));
    assert_eq!(bindings["big"], Value::BigInt("10".to_string()));
    assert_eq!(bindings["default"], Value::Function("Widget".to_string()));
    assert_eq!(bindings["nan"], Value::number(f64::NAN));

    let console = env.take_console();
    assert_eq!(console.len(), 1);
    assert_eq!(console[0][0], Value::from("hello"));
    assert_eq!(
        console[0][2],
        Value::Array(vec![Value::Bool(true), Value::Null])
    );
    assert_eq!(console[0][3], Value::object([("a", Value::Undefined)]));
}

#[tokio::test]
async fn test_external_stubs_and_globals() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let main = write(
        tmp.path(),
        "main.js",
        r#"
import { fn } from 'external';
import value, * as ns from 'lib';
fn();
export const sum = value + ns.extra + x;
assert.strictEqual(typeof fn, 'function');
"#,
    );
    let overrides = FixtureOverride::new()
        .with_globals(|| [("x".to_string(), Value::number(100.0))].into_iter().collect())
        .with_external_modules(
            ExternalModules::new()
                .with("external", |ctx| {
                    ModuleStub::new().function(ctx.console().logger("fn", vec!["external".into()]))
                })
                .with("lib", |_| ModuleStub::new().value("default", 4i64).value("extra", 2i64)),
        );

    let env = Environment::native(Some(&overrides));
    let modules = node.evaluate(&[main], &env).await.unwrap();
    assert_eq!(modules[0].bindings["sum"], Value::number(106.0));
    assert_eq!(env.take_console(), vec![vec![Value::from("external")]]);
}

#[tokio::test]
async fn test_in_memory_output_directory() {
    let Some(node) = node() else { return };
    let dist = PathBuf::from("/bundle-diff-virtual/dist");
    let mut files = BTreeMap::new();
    files.insert(
        dist.join("main.js"),
        "import { shared } from './chunk-1.js';\nexport default shared + 1;\n".to_string(),
    );
    files.insert(dist.join("chunk-1.js"), "export const shared = 1;\n".to_string());
    let bundle = Arc::new(BundleOutput::new(dist.clone(), files));

    let env = Environment::bundled(None, bundle);
    let modules = node.evaluate(&[dist.join("main.js")], &env).await.unwrap();
    assert_eq!(modules[0].bindings["default"], Value::number(2.0));
}

#[tokio::test]
async fn test_shared_modules_evaluate_once_across_entries() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "shared.js", "console.log('shared');\nexport const s = 1;\n");
    let a = write(tmp.path(), "a.js", "export { s as a } from './shared.js';\n");
    let b = write(tmp.path(), "b.js", "export { s as b } from './shared.js';\n");

    let env = Environment::native(None);
    let modules = node.evaluate(&[a, b], &env).await.unwrap();
    assert_eq!(modules.len(), 2);
    assert_eq!(env.take_console(), vec![vec![Value::from("shared")]]);
}

#[tokio::test]
async fn test_throw_reports_entry() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let main = write(tmp.path(), "main.js", "throw new Error('kaboom');\n");

    let env = Environment::native(None);
    let err = node.evaluate(&[main.clone()], &env).await.unwrap_err();
    assert_eq!(err.side, Side::Native);
    assert_eq!(err.entry, Some(main));
    assert!(err.message.contains("kaboom"), "{}", err.message);
}

#[test]
fn test_reads_js_config() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let config = write(
        tmp.path(),
        "_config.js",
        r#"module.exports = defineTest({
  description: 'externals',
  options: { input: ['main1', 'main2'], external: ['lib'], plugins: [{ name: 'x' }] },
  expectedWarnings: ['CIRCULAR_DEPENDENCY']
});
"#,
    );

    let parsed = NodeConfigReader::new(node.program()).read(&config).unwrap();
    assert_eq!(parsed.entries("main.js"), vec!["main1.js", "main2.js"]);
    assert_eq!(parsed.externals(), vec!["lib"]);
    assert!(parsed.expects_circular_dependency());
}

#[tokio::test]
async fn test_inspection_script_sees_live_exports() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let main = write(
        tmp.path(),
        "main.js",
        "export default class Widget { constructor() { console.log('built'); } }\n",
    );

    let overrides =
        FixtureOverride::new().with_script("(namespaces) => { new namespaces[0].default(); }");
    let env = Environment::native(Some(&overrides));
    node.evaluate(&[main.clone()], &env).await.unwrap();
    assert_eq!(env.take_console(), vec![vec![Value::from("built")]]);

    let failing = FixtureOverride::new().with_script("(namespaces) => { new namespaces[0].missing(); }");
    let env = Environment::bundled(
        Some(&failing),
        Arc::new(BundleOutput::new(PathBuf::from("/bundle-diff-virtual/dist"), BTreeMap::new())),
    );
    let err = node.evaluate(&[main], &env).await.unwrap_err();
    assert_eq!(err.side, Side::Bundled);
    assert_eq!(err.entry, None);
    assert!(err.message.starts_with("inspection failed: TypeError"), "{}", err.message);
}

#[test]
fn test_single_external_name_in_js_config() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let config = write(
        tmp.path(),
        "_config.js",
        "module.exports = defineTest({ options: { external: 'lib' } });\n",
    );

    let parsed = NodeConfigReader::new(node.program()).read(&config).unwrap();
    assert_eq!(parsed.externals(), vec!["lib"]);
}

#[test]
fn test_non_literal_externals_are_rejected() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let reader = NodeConfigReader::new(node.program());

    for (name, external) in [("fn.js", "id => id === 'lib'"), ("re.js", "[/^lib/]")] {
        let config = write(
            tmp.path(),
            name,
            &format!("module.exports = defineTest({{ options: {{ external: {} }} }});\n", external),
        );
        let err = reader.read(&config).unwrap_err();
        let DiscoveryError::MalformedConfig { message, .. } = err else {
            panic!("expected malformed config, got {:?}", err);
        };
        assert!(message.contains("options.external must list module names"), "{}", message);
    }
}

#[tokio::test]
async fn test_console_snapshot_leaves_accessors_unevaluated() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let main = write(
        tmp.path(),
        "main.js",
        r#"
const o = { a: 1, get boom() { throw new Error('getter'); }, set only(v) {} };
console.log(o);
export const ok = 1;
"#,
    );

    let env = Environment::native(None);
    let modules = node.evaluate(&[main], &env).await.unwrap();
    assert_eq!(modules[0].bindings["ok"], Value::number(1.0));
    assert_eq!(
        env.take_console(),
        vec![vec![Value::object([
            ("a", Value::number(1.0)),
            ("boom", Value::Accessor("Getter".to_string())),
            ("only", Value::Accessor("Setter".to_string())),
        ])]]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_end_to_end_with_copying_bundler() {
    let Some(node) = node() else { return };
    let tmp = TempDir::new().unwrap();
    let fixture = tmp.path().join("samples/basic");
    fs::create_dir_all(&fixture).unwrap();
    write(&fixture, "main.js", "console.log('hi');\nexport const answer = 42;\n");

    let command = BundlerCommand {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "cp \"$@\"".to_string(),
            "sh".to_string(),
            "{entries}".to_string(),
            "{out_dir}".to_string(),
        ],
        external_args: Vec::new(),
        ..BundlerCommand::default()
    };
    let bundler = CommandBundler::new(command, "/bundle-diff-virtual/dist");
    let case = TestCase::new("samples/basic", &fixture, vec!["main.js".to_string()]);

    let summary = Runner::new(bundler, node)
        .run(std::slice::from_ref(&case), |_, _| {})
        .await
        .unwrap();
    assert_eq!(summary.results[0].outcome, TestOutcome::Pass, "{:?}", summary.results[0].error);
}
