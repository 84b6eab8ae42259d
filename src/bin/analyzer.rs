//! Fairness analysis CLI for weighted scheduler experiments.
//!
//! Reads sender and receiver logs from an outputs directory and reports
//! per-flow bandwidth share, latency, and consistency between the two.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use schedprobe::analysis::{self, types::FlowSpec};
use schedprobe::config::Config;
use schedprobe::config_loader::{self, AnalysisCliOverrides};
use schedprobe::utils::duration::parse_duration;

#[derive(Parser, Debug)]
#[command(name = "schedprobe-analyze")]
#[command(about = "Bandwidth allocation and latency analysis for weighted scheduler runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding sender_h<k>.txt and receiver_h_r<k>.txt logs
    #[arg(default_value = "outputs")]
    outputs_dir: PathBuf,

    /// Comma-separated flow weights, one per flow
    #[arg(long, value_delimiter = ',', global = true)]
    weights: Option<Vec<f64>>,

    /// Aggregation window size (e.g. 10s, 500ms)
    #[arg(long, value_parser = parse_duration, global = true)]
    window_size: Option<std::time::Duration>,

    /// Measurement start (seconds since epoch)
    #[arg(long, global = true)]
    start_time: Option<f64>,

    /// Measurement end (seconds since epoch)
    #[arg(long, global = true)]
    end_time: Option<f64>,

    /// Seconds added to the earliest timestamp when --start-time is unset
    #[arg(long, global = true)]
    start_offset: Option<f64>,

    /// Latencies at or above this are discarded
    #[arg(long, global = true)]
    latency_ceiling_ms: Option<f64>,

    /// Payload text identifying test packets in receiver logs
    #[arg(long, global = true)]
    payload_marker: Option<String>,

    /// Skip the latency consistency check
    #[arg(long, global = true)]
    no_diagnostics: bool,

    /// YAML config with `analysis` and `flows` sections
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for reports (defaults to the outputs directory)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    threads: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Bandwidth allocation, latency and consistency check (default)
    Full,

    /// Bandwidth allocation only; sender logs are not read
    Bandwidth,

    /// Sender-side rate analysis
    SendRate,
}

impl Cli {
    fn overrides(&self) -> AnalysisCliOverrides {
        AnalysisCliOverrides {
            weights: self.weights.clone(),
            window_size: self.window_size,
            start_time: self.start_time,
            end_time: self.end_time,
            start_offset: self.start_offset,
            latency_ceiling_ms: self.latency_ceiling_ms,
            payload_marker: self.payload_marker.clone(),
            no_diagnostics: self.no_diagnostics,
        }
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => config_loader::load_config(path)?,
            None => Config::default(),
        };
        config_loader::apply_analysis_overrides(&mut config, &self.overrides())?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let config = cli.load_config()?;
    let specs = config.flow_specs(&cli.outputs_dir);
    log::info!(
        "Analyzing {} flows from {}",
        specs.len(),
        cli.outputs_dir.display()
    );

    let output = cli.output.clone().unwrap_or_else(|| cli.outputs_dir.clone());
    fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    match cli.command.unwrap_or(Commands::Full) {
        Commands::Full => run_fairness(&cli.outputs_dir, &output, &config, &specs, true),
        Commands::Bandwidth => run_fairness(&cli.outputs_dir, &output, &config, &specs, false),
        Commands::SendRate => run_send_rate(&output, &config, &specs),
    }
}

fn run_fairness(outputs_dir: &Path, output: &Path, config: &Config, specs: &[FlowSpec], latency: bool) -> Result<()> {
    let marker = &config.analysis.payload_marker;
    let flows = if latency {
        analysis::parse_flows(specs, marker)
    } else {
        analysis::parse_receive_flows(specs, marker)
    };

    let mut options = config.analysis.to_options();
    options.latency = latency;

    let report = analysis::analyze_flows(&flows, &options, &outputs_dir.display().to_string())
        .context("Analysis failed")?;

    let stem = if latency { "fairness_report" } else { "bandwidth_report" };
    analysis::generate_json_report(&report, &output.join(format!("{}.json", stem)))?;
    analysis::generate_text_report(&report, &output.join(format!("{}.txt", stem)))?;
    analysis::report::print_summary(&report);

    Ok(())
}

fn run_send_rate(output: &Path, config: &Config, specs: &[FlowSpec]) -> Result<()> {
    let logs = analysis::parse_send_logs(specs);
    let report = analysis::send_rate_report(&logs, config.analysis.start_time, config.analysis.end_time);

    analysis::report::print_send_rates(&report.flows);
    analysis::generate_json_report(&report, &output.join("send_rate_report.json"))?;

    Ok(())
}
