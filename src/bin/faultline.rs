use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use faultline::CancellationToken;
use faultline::host::{HostConfig, LogProgress, TestHostRunner, TestOutcome};

#[derive(Debug, Parser)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Run a test project through the mutation-testing host")]
struct Cli {
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct HostOptions {
    /// Test project file.
    #[arg(long)]
    project: PathBuf,
    /// TOML host config; command-line options override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host executable.
    #[arg(long)]
    program: Option<PathBuf>,
    /// Per-test hang timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Wall-clock limit per host process in seconds.
    #[arg(long)]
    process_timeout_secs: Option<u64>,
    /// Adapter and data collector search path.
    #[arg(long)]
    adapter_path: Option<PathBuf>,
    /// Emit JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the whole project once under the coverage collector.
    Coverage {
        #[command(flatten)]
        host: HostOptions,
    },
    /// Run the named tests, retrying around host crashes.
    Test {
        #[command(flatten)]
        host: HostOptions,
        /// Comma-separated fully qualified test names.
        #[arg(long, value_delimiter = ',', required = true)]
        tests: Vec<String>,
    },
}

fn make_config(options: &HostOptions) -> Result<HostConfig> {
    let mut config = match &options.config {
        Some(path) => HostConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HostConfig::default(),
    };
    config = config.with_project_path(&options.project);
    if let Some(program) = &options.program {
        config = config.with_program(program);
    }
    if let Some(timeout_secs) = options.timeout_secs {
        config = config.with_timeout(Duration::from_secs(timeout_secs));
    }
    if let Some(process_timeout_secs) = options.process_timeout_secs {
        config = config.with_process_timeout(Some(Duration::from_secs(process_timeout_secs)));
    }
    if let Some(adapter_path) = &options.adapter_path {
        config = config.with_adapter_path(adapter_path);
    }
    Ok(config)
}

fn install_cancel_handler(cancel: &CancellationToken) -> Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("received Ctrl-C, stopping the test host");
        cancel.cancel();
    })
    .context("installing Ctrl-C handler")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    install_cancel_handler(&cancel)?;

    match cli.command {
        Command::Coverage { host } => {
            let mut runner = TestHostRunner::new(make_config(&host)?);
            let coverage = runner.run_coverage(&cancel).await?;
            if host.json {
                println!("{}", serde_json::to_string_pretty(&coverage)?);
            } else {
                for test in coverage.tests() {
                    println!("{test}\t{} entities", coverage.covered_by(test).len());
                }
                println!("summary: tests={}", coverage.len());
            }
        }
        Command::Test { host, tests } => {
            let mut runner = TestHostRunner::new(make_config(&host)?);
            let results = runner.run_tests(&cancel, &LogProgress, tests).await?;
            if host.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in results.iter() {
                    println!("{}\t{}", result.outcome, result.name);
                }
                println!(
                    "summary: passed={}, failed={}, skipped={}, crashed={}",
                    results.count(TestOutcome::Passed),
                    results.count(TestOutcome::Failed),
                    results.count(TestOutcome::Skipped),
                    results.count(TestOutcome::Crashed)
                );
            }
        }
    }

    Ok(())
}
