use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::pipeline::AnalysisOptions;
use crate::analysis::types::{FlowSpec, DEFAULT_LATENCY_CEILING_MS, DEFAULT_PAYLOAD_MARKER};

/// Weights used by the reference three-flow experiment
pub const DEFAULT_WEIGHTS: [f64; 3] = [20000.0, 10000.0, 2000.0];

/// How packets are spaced in time
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PacingMode {
    /// Fixed gap between packets
    Interval {
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },
    /// Fixed packets-per-second target
    Pps { pps: f64 },
    /// Pre-built sequence handed to a bulk sender at `pps`
    Burst { pps: f64 },
}

impl PacingMode {
    /// Target rate in packets per second
    pub fn rate_pps(&self) -> f64 {
        match self {
            PacingMode::Interval { interval } => {
                let secs = interval.as_secs_f64();
                if secs > 0.0 {
                    1.0 / secs
                } else {
                    0.0
                }
            }
            PacingMode::Pps { pps } | PacingMode::Burst { pps } => *pps,
        }
    }

    /// Nominal gap between consecutive packets; fails when `1 / pps` does
    /// not fit a `Duration`
    pub fn nominal_interval(&self) -> Result<Duration, ValidationError> {
        match self {
            PacingMode::Interval { interval } => Ok(*interval),
            PacingMode::Pps { pps } | PacingMode::Burst { pps } => Duration::try_from_secs_f64(1.0 / pps)
                .map_err(|e| ValidationError::InvalidEmitter(format!("send rate {} packets/sec: {}", pps, e))),
        }
    }

    pub fn is_burst(&self) -> bool {
        matches!(self, PacingMode::Burst { .. })
    }
}

impl Default for PacingMode {
    fn default() -> Self {
        PacingMode::Interval {
            interval: Duration::from_millis(1),
        }
    }
}

/// Where per-packet rank values come from
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadSource {
    /// One rank per line
    File(PathBuf),
    /// `count` packets, all with the same rank
    Synthetic { count: u64, rank: i32 },
}

/// Traffic emitter configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EmitterConfig {
    /// Destination host name or address
    pub destination: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub flow_id: usize,
    #[serde(default)]
    pub pacing: PacingMode,
    /// `{file: PATH}` or `{synthetic: {count, rank}}`
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub workload: WorkloadSource,
    /// Stop after this long
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_packets: Option<u64>,
    /// Record every Nth send; 0 disables the send log
    #[serde(default = "default_log_every")]
    pub log_every: u64,
    #[serde(default = "default_payload_marker")]
    pub payload_marker: String,
    /// Send log destination; stdout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl EmitterConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.destination.trim().is_empty() {
            return Err(ValidationError::InvalidEmitter(
                "destination cannot be empty".to_string(),
            ));
        }

        let rate = self.pacing.rate_pps();
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ValidationError::InvalidEmitter(format!(
                "send rate must be positive, got {} packets/sec",
                rate
            )));
        }
        self.pacing.nominal_interval()?;

        if let WorkloadSource::Synthetic { count, .. } = self.workload {
            if count == 0 {
                return Err(ValidationError::InvalidEmitter(
                    "synthetic workload needs at least one packet".to_string(),
                ));
            }
        }

        if self.max_packets == Some(0) {
            return Err(ValidationError::InvalidEmitter(
                "max_packets must be at least 1".to_string(),
            ));
        }

        if self.duration == Some(Duration::ZERO) {
            return Err(ValidationError::InvalidEmitter(
                "duration must be positive when set".to_string(),
            ));
        }

        if self.payload_marker.is_empty() {
            return Err(ValidationError::InvalidEmitter(
                "payload_marker cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Analysis configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    #[serde(with = "humantime_serde")]
    pub window_size: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Seconds added to the earliest timestamp when `start_time` is unset
    pub start_offset: f64,
    pub latency_ceiling_ms: f64,
    pub payload_marker: String,
    pub diagnostics: bool,
    /// Per-flow weights for flows found by file naming convention
    pub weights: Vec<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: Duration::from_secs(10),
            start_time: None,
            end_time: None,
            start_offset: 0.0,
            latency_ceiling_ms: DEFAULT_LATENCY_CEILING_MS,
            payload_marker: DEFAULT_PAYLOAD_MARKER.to_string(),
            diagnostics: true,
            weights: DEFAULT_WEIGHTS.to_vec(),
        }
    }
}

impl AnalysisConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.window_size.is_zero() {
            return Err(ValidationError::InvalidAnalysis(
                "window_size must be positive".to_string(),
            ));
        }

        validate_weights(&self.weights)?;

        if !(self.latency_ceiling_ms > 0.0) || !self.latency_ceiling_ms.is_finite() {
            return Err(ValidationError::InvalidAnalysis(format!(
                "latency_ceiling_ms must be positive, got {}",
                self.latency_ceiling_ms
            )));
        }

        if !self.start_offset.is_finite() || self.start_offset < 0.0 {
            return Err(ValidationError::InvalidAnalysis(
                "start_offset must be a non-negative number of seconds".to_string(),
            ));
        }

        for (name, bound) in [("start_time", self.start_time), ("end_time", self.end_time)] {
            if let Some(t) = bound.filter(|t| !t.is_finite()) {
                return Err(ValidationError::InvalidAnalysis(format!(
                    "{} must be a finite timestamp, got {}",
                    name, t
                )));
            }
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(ValidationError::InvalidAnalysis(format!(
                    "end_time {} must be after start_time {}",
                    end, start
                )));
            }
        }

        if self.payload_marker.is_empty() {
            return Err(ValidationError::InvalidAnalysis(
                "payload_marker cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Translate into options for the analysis pipeline
    pub fn to_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            window_size_sec: self.window_size.as_secs_f64(),
            start_time: self.start_time,
            end_time: self.end_time,
            start_offset_sec: self.start_offset,
            latency_ceiling_ms: self.latency_ceiling_ms,
            payload_marker: self.payload_marker.clone(),
            latency: true,
            diagnostics: self.diagnostics,
        }
    }

    /// Flows named by convention inside `outputs_dir`: flow `i` reads
    /// `sender_h{i+1}.txt` and `receiver_h_r{i+1}.txt`.
    pub fn conventional_flows(&self, outputs_dir: &Path) -> Vec<FlowSpec> {
        self.weights
            .iter()
            .enumerate()
            .map(|(id, &weight)| FlowSpec {
                id,
                weight,
                sender_log: outputs_dir.join(format!("sender_h{}.txt", id + 1)),
                receiver_log: outputs_dir.join(format!("receiver_h_r{}.txt", id + 1)),
            })
            .collect()
    }
}

fn validate_weights(weights: &[f64]) -> Result<(), ValidationError> {
    if weights.is_empty() {
        return Err(ValidationError::InvalidFlows(
            "at least one flow weight is required".to_string(),
        ));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
        return Err(ValidationError::InvalidFlows(format!(
            "weights must be positive, got {}",
            bad
        )));
    }
    Ok(())
}

/// Explicitly listed flow
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FlowConfig {
    pub weight: f64,
    pub sender_log: PathBuf,
    pub receiver_log: PathBuf,
}

/// Top-level configuration file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitter: Option<EmitterConfig>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flows: Option<Vec<FlowConfig>>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(emitter) = &self.emitter {
            emitter.validate()?;
        }

        self.analysis.validate()?;

        if let Some(flows) = &self.flows {
            let weights: Vec<f64> = flows.iter().map(|f| f.weight).collect();
            validate_weights(&weights)?;
        }

        Ok(())
    }

    /// Flows to analyze: the explicit list if present, otherwise the naming
    /// convention inside `outputs_dir`. Relative paths resolve against
    /// `outputs_dir`.
    pub fn flow_specs(&self, outputs_dir: &Path) -> Vec<FlowSpec> {
        match &self.flows {
            Some(flows) => flows
                .iter()
                .enumerate()
                .map(|(id, f)| FlowSpec {
                    id,
                    weight: f.weight,
                    sender_log: outputs_dir.join(&f.sender_log),
                    receiver_log: outputs_dir.join(&f.receiver_log),
                })
                .collect(),
            None => self.analysis.conventional_flows(outputs_dir),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid emitter configuration: {0}")]
    InvalidEmitter(String),
    #[error("Invalid analysis configuration: {0}")]
    InvalidAnalysis(String),
    #[error("Invalid flow configuration: {0}")]
    InvalidFlows(String),
}

fn default_port() -> u16 {
    5000
}

fn default_log_every() -> u64 {
    1
}

fn default_payload_marker() -> String {
    DEFAULT_PAYLOAD_MARKER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_config_parsing() {
        let yaml = r#"
destination: "10.0.2.1"
flow_id: 2
pacing:
  mode: pps
  pps: 25
workload:
  synthetic:
    count: 100000
    rank: 2000
duration: 30s
log_every: 10
"#;
        let config: EmitterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.flow_id, 2);
        assert_eq!(config.pacing, PacingMode::Pps { pps: 25.0 });
        assert_eq!(config.workload, WorkloadSource::Synthetic { count: 100000, rank: 2000 });
        assert_eq!(config.duration, Some(Duration::from_secs(30)));
        assert_eq!(config.payload_marker, DEFAULT_PAYLOAD_MARKER);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_pacing() {
        let yaml = r#"
destination: "h_r1"
pacing:
  mode: interval
  interval: 40ms
workload:
  file: ranks.txt
"#;
        let config: EmitterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.workload, WorkloadSource::File(PathBuf::from("ranks.txt")));
        assert!((config.pacing.rate_pps() - 25.0).abs() < 1e-9);
        assert_eq!(config.pacing.nominal_interval(), Ok(Duration::from_millis(40)));
    }

    #[test]
    fn test_workload_written_as_map() {
        let config = EmitterConfig {
            destination: "10.0.2.1".to_string(),
            port: 5000,
            flow_id: 1,
            pacing: PacingMode::default(),
            workload: WorkloadSource::Synthetic { count: 10, rank: 7 },
            duration: None,
            max_packets: None,
            log_every: 1,
            payload_marker: DEFAULT_PAYLOAD_MARKER.to_string(),
            log_file: None,
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("workload:\n  synthetic:\n"), "{}", yaml);
        assert!(!yaml.contains('!'));

        let reloaded: EmitterConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_emitter_validation_errors() {
        let mut config = EmitterConfig {
            destination: "10.0.2.1".to_string(),
            port: 5000,
            flow_id: 0,
            pacing: PacingMode::Pps { pps: 0.0 },
            workload: WorkloadSource::Synthetic { count: 10, rank: 2000 },
            duration: None,
            max_packets: None,
            log_every: 1,
            payload_marker: DEFAULT_PAYLOAD_MARKER.to_string(),
            log_file: None,
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidEmitter(_))));

        config.pacing = PacingMode::Burst { pps: -3.0 };
        assert!(config.validate().is_err());

        config.pacing = PacingMode::Pps { pps: 1e-30 };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidEmitter(_))));
        assert!(config.pacing.nominal_interval().is_err());

        config.pacing = PacingMode::Burst { pps: 100.0 };
        assert!(config.validate().is_ok());
        assert_eq!(config.pacing.nominal_interval(), Ok(Duration::from_millis(10)));

        config.max_packets = Some(0);
        assert!(config.validate().is_err());
        config.max_packets = None;

        config.workload = WorkloadSource::Synthetic { count: 0, rank: 1 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_analysis_defaults_and_validation() {
        let config: Config = serde_yaml::from_str("analysis:\n  window_size: 5s\n").unwrap();
        assert_eq!(config.analysis.window_size, Duration::from_secs(5));
        assert_eq!(config.analysis.weights, DEFAULT_WEIGHTS.to_vec());
        assert!(config.validate().is_ok());

        let mut analysis = AnalysisConfig::default();
        analysis.weights = vec![1.0, 0.0];
        assert!(matches!(analysis.validate(), Err(ValidationError::InvalidFlows(_))));

        let mut analysis = AnalysisConfig::default();
        analysis.window_size = Duration::ZERO;
        assert!(analysis.validate().is_err());

        let mut analysis = AnalysisConfig::default();
        analysis.start_time = Some(20.0);
        analysis.end_time = Some(10.0);
        assert!(analysis.validate().is_err());
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut analysis = AnalysisConfig::default();
            analysis.start_time = Some(bad);
            assert!(matches!(analysis.validate(), Err(ValidationError::InvalidAnalysis(_))));

            let mut analysis = AnalysisConfig::default();
            analysis.end_time = Some(bad);
            assert!(matches!(analysis.validate(), Err(ValidationError::InvalidAnalysis(_))));
        }

        let mut analysis = AnalysisConfig::default();
        analysis.latency_ceiling_ms = f64::INFINITY;
        assert!(analysis.validate().is_err());
    }

    #[test]
    fn test_flow_specs() {
        let dir = Path::new("outputs");
        let config = Config::default();
        let specs = config.flow_specs(dir);
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[1].sender_log, dir.join("sender_h2.txt"));
        assert_eq!(specs[2].receiver_log, dir.join("receiver_h_r3.txt"));
        assert_eq!(specs[0].weight, 20000.0);

        let yaml = r#"
flows:
  - weight: 3
    sender_log: a_send.txt
    receiver_log: a_recv.txt
  - weight: 1
    sender_log: /abs/b_send.txt
    receiver_log: b_recv.txt
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let specs = config.flow_specs(dir);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].sender_log, dir.join("a_send.txt"));
        assert_eq!(specs[1].sender_log, PathBuf::from("/abs/b_send.txt"));
        assert_eq!(specs[1].id, 1);
    }
}
