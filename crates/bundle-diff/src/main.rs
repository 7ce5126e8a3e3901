use clap::Parser;
use colored::*;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use bundle_diff::compare::RunComparison;
use bundle_diff::discovery::discover;
use bundle_diff::node::NodeConfigReader;
use bundle_diff::report::print_verdict;
use bundle_diff::{CommandBundler, HarnessConfig, NodeLoader, PersistedReport, Runner, TestReport};

#[derive(Parser, Debug)]
#[command(name = "bundle-diff")]
#[command(about = "Compare fixture behavior before and after bundling")]
struct Cli {
    /// Stop after the first failing fixture
    #[arg(short, long)]
    bail: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: failed to start runtime: {}", "Error".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = HarnessConfig::load_or_default()?;
    let node = NodeLoader::locate(&config.node)?.with_output_format(config.output_format);
    let reader = NodeConfigReader::new(node.program());
    let discovered = discover(&config.discovery_options(), &reader, &config.overrides())?;

    let bundler = CommandBundler::new(config.bundler.clone(), config.dist_dir());
    let runner = Runner::new(bundler, node)
        .with_output_format(config.output_format)
        .with_bail(cli.bail);

    let run_start = Instant::now();
    let summary = runner
        .run(&discovered.cases, |case, verdict| print_verdict(&case.id, verdict))
        .await?;

    if let Some(id) = &summary.bailed_on {
        eprintln!("{}", format!("Bailed after {}", id).red().bold());
        return Ok(ExitCode::FAILURE);
    }

    let report = TestReport::from_results(&summary.results);
    report.print_summary();

    let mut regressed = false;
    if config.save.is_some() || config.baseline.is_some() {
        let persisted = PersistedReport::new(summary.results.clone(), run_start.elapsed().as_secs_f64());
        if let Some(path) = &config.save {
            match persisted.save(path) {
                Ok(()) => eprintln!("Results saved to {}", path.display()),
                Err(e) => eprintln!("Failed to save results: {}", e),
            }
        }
        if let Some(path) = &config.baseline {
            let base = PersistedReport::load(path)
                .map_err(|e| format!("failed to load baseline '{}': {}", path.display(), e))?;
            let comparison = RunComparison::compare(&base, &persisted);
            comparison.print();
            regressed = comparison.has_regressions();
        }
    }

    if summary.has_failures() || regressed {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
