//! Rate-paced traffic emitter for weighted scheduler experiments.
//!
//! Sends one flow of rank-tagged UDP packets and writes the send log the
//! analyzer reads back.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::info;

use schedprobe::analysis::types::DEFAULT_PAYLOAD_MARKER;
use schedprobe::config::{EmitterConfig, PacingMode, WorkloadSource};
use schedprobe::config_loader;
use schedprobe::emitter::{self, CancelFlag, EmitError};
use schedprobe::utils::duration::parse_duration;

const DEFAULT_RANK: i32 = 2000;

/// Send a rate-paced flow of rank-tagged packets
#[derive(Parser, Debug)]
#[command(name = "schedprobe", author, version, about, long_about = None)]
struct Args {
    /// Destination host name or address
    #[arg(long)]
    des: Option<String>,

    /// Destination UDP port
    #[arg(long)]
    port: Option<u16>,

    /// Workload file with one rank per line
    #[arg(long, conflicts_with = "num_packets")]
    workload: Option<PathBuf>,

    /// Number of synthetic packets, all with --rank-value
    #[arg(long)]
    num_packets: Option<u64>,

    /// Rank carried by synthetic packets
    #[arg(long, default_value_t = DEFAULT_RANK)]
    rank_value: i32,

    /// Gap between packets (e.g. 1ms, 0.04s)
    #[arg(long, value_parser = parse_duration, conflicts_with = "pps")]
    interval: Option<Duration>,

    /// Target rate in packets per second
    #[arg(long)]
    pps: Option<f64>,

    /// Hand the whole sequence to one bulk send; timestamps are interpolated
    #[arg(long)]
    burst: bool,

    /// Stop after this long (e.g. 30s, 1.5m)
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Stop after this many packets
    #[arg(long)]
    max_packets: Option<u64>,

    /// Record every Nth send in the log (0 disables the log)
    #[arg(long)]
    log_every: Option<u64>,

    /// Flow id used in the banner and summary
    #[arg(long)]
    flow_id: Option<usize>,

    /// Payload text appended after the rank
    #[arg(long)]
    payload_marker: Option<String>,

    /// Write the send log here instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// YAML config with an `emitter` section; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn pacing(&self, base: Option<&PacingMode>) -> PacingMode {
        let explicit = match (self.pps, self.interval) {
            (Some(pps), _) => Some(PacingMode::Pps { pps }),
            (None, Some(interval)) => Some(PacingMode::Interval { interval }),
            (None, None) => None,
        };
        let pacing = explicit
            .or_else(|| base.cloned())
            .unwrap_or_default();

        if self.burst {
            PacingMode::Burst {
                pps: pacing.rate_pps(),
            }
        } else {
            pacing
        }
    }

    fn workload(&self) -> Option<WorkloadSource> {
        match (&self.workload, self.num_packets) {
            (Some(path), _) => Some(WorkloadSource::File(path.clone())),
            (None, Some(count)) => Some(WorkloadSource::Synthetic {
                count,
                rank: self.rank_value,
            }),
            (None, None) => None,
        }
    }

    /// Merge flags over the config file, if any
    fn to_config(&self) -> Result<EmitterConfig> {
        let base = match &self.config {
            Some(path) => Some(config_loader::load_emitter_config(path)?),
            None => None,
        };

        let destination = self
            .des
            .clone()
            .or_else(|| base.as_ref().map(|b| b.destination.clone()))
            .ok_or_else(|| eyre!("--des is required when no config file is given"))?;

        let workload = self
            .workload()
            .or_else(|| base.as_ref().map(|b| b.workload.clone()))
            .ok_or_else(|| eyre!("Must provide --workload (rank file) or --num-packets (packet count)"))?;

        Ok(EmitterConfig {
            destination,
            port: self.port.or(base.as_ref().map(|b| b.port)).unwrap_or(5000),
            flow_id: self.flow_id.or(base.as_ref().map(|b| b.flow_id)).unwrap_or(0),
            pacing: self.pacing(base.as_ref().map(|b| &b.pacing)),
            workload,
            duration: self.duration.or(base.as_ref().and_then(|b| b.duration)),
            max_packets: self.max_packets.or(base.as_ref().and_then(|b| b.max_packets)),
            log_every: self.log_every.or(base.as_ref().map(|b| b.log_every)).unwrap_or(1),
            payload_marker: self
                .payload_marker
                .clone()
                .or_else(|| base.as_ref().map(|b| b.payload_marker.clone()))
                .unwrap_or_else(|| DEFAULT_PAYLOAD_MARKER.to_string()),
            log_file: self
                .log_file
                .clone()
                .or_else(|| base.as_ref().and_then(|b| b.log_file.clone())),
        })
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    let config = args.to_config()?;
    info!(
        "Flow {}: {} -> {}:{}",
        config.flow_id,
        if config.pacing.is_burst() { "burst" } else { "paced" },
        config.destination,
        config.port
    );

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).wrap_err("Failed to install Ctrl-C handler")?;
    }

    match emitter::run_emitter(&config, &cancel) {
        Ok(outcome) => {
            info!(
                "Flow {}: sending completed, {} packets ({} errors)",
                config.flow_id, outcome.sent, outcome.errors
            );
            Ok(())
        }
        Err(EmitError::Interrupted { sent }) => {
            eprintln!("\nInterrupted: sent {} packets", sent);
            Err(eyre!("Flow {} interrupted after {} packets", config.flow_id, sent))
        }
        Err(e) => Err(e).wrap_err_with(|| format!("Flow {} failed", config.flow_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "schedprobe",
            "--des", "10.0.2.1",
            "--num-packets", "100000",
            "--pps", "192",
            "--duration", "30s",
            "--flow-id", "1",
        ]);

        let config = args.to_config().unwrap();
        assert_eq!(config.destination, "10.0.2.1");
        assert_eq!(config.workload, WorkloadSource::Synthetic { count: 100000, rank: 2000 });
        assert_eq!(config.pacing, PacingMode::Pps { pps: 192.0 });
        assert_eq!(config.duration, Some(Duration::from_secs(30)));
        assert_eq!(config.log_every, 1);
        assert_eq!(config.payload_marker, DEFAULT_PAYLOAD_MARKER);
    }

    #[test]
    fn test_interval_and_burst() {
        let args = Args::parse_from([
            "schedprobe", "--des", "h_r1", "--workload", "ranks.txt", "--interval", "40ms",
        ]);
        assert_eq!(
            args.to_config().unwrap().pacing,
            PacingMode::Interval { interval: Duration::from_millis(40) }
        );

        let args = Args::parse_from([
            "schedprobe", "--des", "h_r1", "--num-packets", "10", "--interval", "40ms", "--burst",
        ]);
        let pacing = args.to_config().unwrap().pacing;
        assert!(pacing.is_burst());
        match pacing {
            PacingMode::Burst { pps } => assert!((pps - 25.0).abs() < 1e-9),
            other => panic!("expected burst pacing, got {:?}", other),
        }

        // Default pacing is one packet per millisecond
        let args = Args::parse_from(["schedprobe", "--des", "h", "--num-packets", "1"]);
        let pacing = args.to_config().unwrap().pacing;
        assert!((pacing.rate_pps() - 1000.0).abs() < 1e-6);
        assert!(!pacing.is_burst());
    }

    #[test]
    fn test_conflicting_flags() {
        assert!(Args::try_parse_from([
            "schedprobe", "--des", "h", "--num-packets", "1", "--pps", "5", "--interval", "1s",
        ])
        .is_err());
        assert!(Args::try_parse_from([
            "schedprobe", "--des", "h", "--num-packets", "1", "--workload", "w.txt",
        ])
        .is_err());
    }

    #[test]
    fn test_missing_workload_or_destination() {
        let args = Args::parse_from(["schedprobe", "--des", "h"]);
        assert!(args.to_config().is_err());
        let args = Args::parse_from(["schedprobe", "--num-packets", "5"]);
        assert!(args.to_config().is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let yaml = r#"
emitter:
  destination: "10.0.3.1"
  port: 6000
  flow_id: 3
  pacing:
    mode: pps
    pps: 10
  workload:
    synthetic:
      count: 500
      rank: 7
  log_every: 50
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();
        let path = temp_file.path().to_str().unwrap();

        let args = Args::parse_from(["schedprobe", "--config", path, "--pps", "48"]);
        let config = args.to_config().unwrap();
        assert_eq!(config.destination, "10.0.3.1");
        assert_eq!(config.port, 6000);
        assert_eq!(config.flow_id, 3);
        assert_eq!(config.log_every, 50);
        assert_eq!(config.pacing, PacingMode::Pps { pps: 48.0 });
        assert_eq!(config.workload, WorkloadSource::Synthetic { count: 500, rank: 7 });
    }
}
