//! Rowpilot CLI - Main Entry Point
//!
//! Loads row-driven test files, runs them against a Playwright-driven
//! browser and prints the per-case summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use rowpilot_common::{BrowserKind, RunnerConfig};
use rowpilot_engine::device::builtin_profiles;
use rowpilot_engine::{
    load_test_files, FileProgressSink, JsonReportWriter, NullProgressSink, PlaywrightConfig,
    PlaywrightLauncher, ProgressSink, SuiteRunner, YamlRowLoader,
};

mod output;

use output::{print_error, print_list, print_success, print_summary, DeviceDisplay, OutputFormat};

/// Rowpilot - row-driven browser tests with evidence capture
#[derive(Parser)]
#[command(name = "rowpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "ROWPILOT_CONFIG", default_value = "rowpilot.toml", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test files or directories of test files
    Run(RunArgs),

    /// List built-in device profiles
    Devices,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Test files (.yaml, .yml, .json) or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Browser: chromium, firefox, webkit or edge
    #[arg(short, long, env = "ROWPILOT_BROWSER")]
    browser: Option<BrowserKind>,

    /// Run without a visible browser window
    #[arg(long, env = "ROWPILOT_HEADLESS", conflicts_with = "headed")]
    headless: bool,

    /// Run with a visible browser window
    #[arg(long)]
    headed: bool,

    /// Root directory for result folders
    #[arg(long, env = "ROWPILOT_RESULTS_DIR")]
    results_dir: Option<PathBuf>,

    /// File polled by an external progress display
    #[arg(long, env = "ROWPILOT_PROGRESS_FILE")]
    progress_file: Option<PathBuf>,

    /// Node.js executable used for the Playwright bridge
    #[arg(long, env = "ROWPILOT_NODE")]
    node: Option<String>,
}

impl RunArgs {
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(browser) = self.browser {
            config.browser = browser;
        }
        if self.headless {
            config.headless = true;
        }
        if self.headed {
            config.headless = false;
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if let Some(path) = &self.progress_file {
            config.progress_file = Some(path.clone());
        }
        if let Some(node) = &self.node {
            config.node_binary = node.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let outcome = match cli.command {
        Commands::Run(ref args) => run(&cli, args).await,
        Commands::Devices => {
            let devices: Vec<DeviceDisplay> =
                builtin_profiles().into_iter().map(DeviceDisplay::from).collect();
            print_list(&devices, cli.format);
            Ok(true)
        }
        Commands::InitConfig { force } => init_config(&cli.config, force),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

/// Returns whether every test case passed
async fn run(cli: &Cli, args: &RunArgs) -> Result<bool> {
    let mut config = RunnerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    let files = load_test_files(&args.inputs, &YamlRowLoader)?;
    info!("🌐 Browser: {} (headless: {})", config.browser, config.headless);

    let sink: Arc<dyn ProgressSink> = if config.headless {
        Arc::new(FileProgressSink::new(config.progress_file()))
    } else {
        Arc::new(NullProgressSink)
    };
    let launcher = PlaywrightLauncher::new(PlaywrightConfig::from(&config));

    let runner = SuiteRunner::new(config, Arc::new(launcher), Arc::new(JsonReportWriter), sink);
    let summary = runner.run(files).await?;

    print_summary(&summary, cli.format);
    Ok(summary.success())
}

fn init_config(path: &std::path::Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    RunnerConfig::default().save(path)?;
    print_success(&format!("Configuration written to {}", path.display()));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_override_config() {
        let cli = Cli::parse_from([
            "rowpilot",
            "run",
            "suites/",
            "--browser",
            "firefox",
            "--headless",
            "--results-dir",
            "out",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let mut config = RunnerConfig::default();
        args.apply(&mut config);
        assert_eq!(config.browser, BrowserKind::Firefox);
        assert!(config.headless);
        assert_eq!(config.results_dir, PathBuf::from("out"));
        assert_eq!(args.inputs, vec![PathBuf::from("suites/")]);
    }

    #[test]
    fn test_headed_and_headless_conflict() {
        let parsed = Cli::try_parse_from(["rowpilot", "run", "a.yaml", "--headless", "--headed"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rowpilot.toml");

        assert!(init_config(&path, false).unwrap());
        assert!(init_config(&path, false).is_err());
        assert!(init_config(&path, true).unwrap());

        let loaded = RunnerConfig::load(&path).unwrap();
        assert_eq!(loaded.network_freshness_ms, 1500);
    }
}
