use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flowcov_core::config::{Config, ReportType};
use flowcov_core::pipeline;
use flowcov_core::types::CoverageSummary;
use flowcov_report::{badge, json, text};

#[derive(Parser)]
#[command(name = "flowcov")]
#[command(about = "Collect and report Flow type coverage across a source tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect coverage for the files selected by the include globs and
    /// render the configured reports
    Report {
        /// Path to the project root
        path: Option<PathBuf>,
        /// Include the files selected by this glob (repeatable)
        #[arg(short = 'i', long = "include-glob")]
        include_glob: Vec<String>,
        /// Exclude files matching this glob (repeatable)
        #[arg(short = 'x', long = "exclude-glob")]
        exclude_glob: Vec<String>,
        /// Report types to generate: text, json, badge (repeatable)
        #[arg(short = 't', long = "type")]
        report_type: Vec<String>,
        /// Minimum coverage percent required to exit 0
        #[arg(long)]
        threshold: Option<f64>,
        /// Fractional digits when computing percent values
        #[arg(long)]
        percent_decimals: Option<u8>,
        /// Upper bound on simultaneously in-flight coverage commands
        #[arg(long)]
        concurrent_files: Option<usize>,
        /// Count only @flow, @flow strict and @flow strict-local files as covered
        #[arg(long)]
        strict_coverage: bool,
        /// Omit files without an @flow pragma from collection entirely
        #[arg(long)]
        exclude_non_flow: bool,
        /// Path to the flow executable
        #[arg(short = 'f', long)]
        flow_command_path: Option<String>,
        /// Per-file coverage command timeout, milliseconds
        #[arg(long)]
        flow_command_timeout: Option<u64>,
        /// Directory for generated json/badge reports
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,
        /// Config file path (defaults to .flowcov.toml in the project root)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
        /// Ignore any config file and use defaults plus CLI flags
        #[arg(long)]
        no_config: bool,
    },
    /// Create a default .flowcov.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("FLOWCOV_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        command @ Commands::Report { .. } => cmd_report(command).await,
        Commands::Init { force } => cmd_init(force).map(|()| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}

async fn cmd_report(command: Commands) -> Result<bool> {
    let Commands::Report {
        path,
        include_glob,
        exclude_glob,
        report_type,
        threshold,
        percent_decimals,
        concurrent_files,
        strict_coverage,
        exclude_non_flow,
        flow_command_path,
        flow_command_timeout,
        output_dir,
        config,
        no_config,
    } = command
    else {
        unreachable!("cmd_report is only called for the report subcommand");
    };

    let project_dir = path
        .unwrap_or_else(|| PathBuf::from("."))
        .canonicalize()
        .context("project dir does not exist")?;

    let mut config = load_config(&project_dir, config.as_deref(), no_config)?;
    config.project_dir = project_dir;

    // CLI flags override config-file values.
    if !include_glob.is_empty() {
        config.glob_include_patterns = include_glob;
    }
    if !exclude_glob.is_empty() {
        config.glob_exclude_patterns = exclude_glob;
    }
    if !report_type.is_empty() {
        config.report_types = report_type
            .iter()
            .map(|t| t.parse::<ReportType>())
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(threshold) = threshold {
        config.threshold = threshold;
    }
    if let Some(percent_decimals) = percent_decimals {
        config.percent_decimals = percent_decimals;
    }
    if let Some(concurrent_files) = concurrent_files {
        config.concurrent_files = concurrent_files;
    }
    if strict_coverage {
        config.strict_coverage = true;
    }
    if exclude_non_flow {
        config.exclude_non_flow = true;
    }
    if let Some(flow_command_path) = flow_command_path {
        config.flow_command_path = resolve_command_path(flow_command_path);
    }
    if let Some(flow_command_timeout) = flow_command_timeout {
        config.flow_command_timeout = flow_command_timeout;
    }
    if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
    }

    let summary = pipeline::collect_coverage(&config).await?;

    render_reports(&summary, &config)?;

    // Coverage below threshold is a normal terminal state, mapped to a
    // non-zero exit, not an error.
    Ok(summary.percent >= summary.threshold)
}

fn render_reports(summary: &CoverageSummary, config: &Config) -> Result<()> {
    let output_dir = config.resolved_output_dir();

    for report_type in &config.report_types {
        match report_type {
            ReportType::Text => print!("{}", text::format_report(summary)),
            ReportType::Json => {
                let path = json::write_report(summary, &output_dir)?;
                eprintln!("JSON report saved to {}", path.display());
            }
            ReportType::Badge => {
                for path in badge::write_badges(summary, &output_dir)? {
                    eprintln!("Badge saved to {}", path.display());
                }
            }
        }
    }
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(".flowcov.toml");
    if target.exists() && !force {
        anyhow::bail!(".flowcov.toml already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())?;
    println!("Created .flowcov.toml with default configuration.");
    Ok(())
}

fn load_config(project_dir: &Path, config_path: Option<&Path>, no_config: bool) -> Result<Config> {
    if no_config {
        return Ok(Config::default());
    }
    match config_path {
        Some(p) => Config::load(p),
        None => Ok(Config::load_or_default(project_dir)),
    }
}

/// A relative `./`-prefixed flow command is resolved against the current
/// working dir, not the project dir, matching how users invoke it.
fn resolve_command_path(path: String) -> String {
    if let Some(stripped) = path.strip_prefix("./") {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(stripped).to_string_lossy().to_string();
        }
    }
    path
}
