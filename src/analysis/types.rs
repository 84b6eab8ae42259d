//! Core data types for scheduler fairness analysis.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Wall-clock timestamp in seconds since the Unix epoch, as written by the
/// sender and receiver hosts.
pub type Timestamp = f64;

/// Default payload text identifying test traffic in receiver logs
pub const DEFAULT_PAYLOAD_MARKER: &str = "P4 is cool";

/// Default latency ceiling in milliseconds (120 s)
pub const DEFAULT_LATENCY_CEILING_MS: f64 = 120_000.0;

/// One recorded send from a sender log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SendEvent {
    /// 1-based cumulative packet count at the time of the record
    pub seq: u64,
    pub timestamp: Timestamp,
}

/// One test packet arrival from a receiver log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiveEvent {
    pub timestamp: Timestamp,
}

/// Where the per-packet send timestamps came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    /// Read from the clock right after each send
    #[default]
    Measured,
    /// Reconstructed by interpolation over a burst; theoretical only
    Interpolated,
}

impl std::fmt::Display for TimestampKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampKind::Measured => write!(f, "measured"),
            TimestampKind::Interpolated => write!(f, "interpolated"),
        }
    }
}

/// Terminal summary printed by the emitter, used only as a cross-check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendSummary {
    pub total_packets: Option<u64>,
    pub total_time_sec: Option<f64>,
    pub average_rate: Option<f64>,
}

impl SendSummary {
    pub fn is_empty(&self) -> bool {
        self.total_packets.is_none() && self.total_time_sec.is_none() && self.average_rate.is_none()
    }
}

/// Everything parsed out of one sender log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendLog {
    pub events: Vec<SendEvent>,
    pub summary: Option<SendSummary>,
    pub timestamps: TimestampKind,
}

/// Declared flow: identity, weight and where its logs live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub id: usize,
    pub weight: f64,
    pub sender_log: PathBuf,
    pub receiver_log: PathBuf,
}

/// All parsed events of a single flow
#[derive(Debug, Clone, Default)]
pub struct FlowData {
    pub id: usize,
    pub weight: f64,
    pub send_log: SendLog,
    pub receives: Vec<ReceiveEvent>,
}

impl FlowData {
    pub fn new(id: usize, weight: f64) -> Self {
        Self {
            id,
            weight,
            ..Default::default()
        }
    }

    pub fn sends(&self) -> &[SendEvent] {
        &self.send_log.events
    }

    pub fn is_empty(&self) -> bool {
        self.receives.is_empty() && self.send_log.events.is_empty()
    }
}

/// A matched send/receive pair with a valid latency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub flow_id: usize,
    pub seq: u64,
    pub arrival: Timestamp,
    pub latency_ms: f64,
}

/// Why a receive event produced no latency sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The inferred sequence number has no record in the sender log
    NoMatchingSendRecord,
    /// Arrival precedes the send (reordering or clock skew)
    NegativeLatency,
    /// Latency at or above the configured ceiling
    LatencyOverCeiling,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NoMatchingSendRecord => write!(f, "no-matching-send-record"),
            FailureReason::NegativeLatency => write!(f, "negative-latency"),
            FailureReason::LatencyOverCeiling => write!(f, "latency-over-ceiling"),
        }
    }
}

/// A receive event that failed to yield a latency sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// 0-based position in arrival order
    pub receive_index: usize,
    pub arrival: Timestamp,
    pub send_time: Option<Timestamp>,
    pub latency_ms: Option<f64>,
    pub reason: FailureReason,
}

/// A time range used for aggregation.
///
/// Ranges are half-open unless `end_inclusive` is set, which is the case for
/// the final window of a slicing and for whole-interval aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
    pub end_inclusive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start,
            end,
            end_inclusive: false,
            label: None,
        }
    }

    pub fn closed(start: Timestamp, end: Timestamp) -> Self {
        Self {
            end_inclusive: true,
            ..Self::new(start, end)
        }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        if self.end_inclusive {
            t >= self.start && t <= self.end
        } else {
            t >= self.start && t < self.end
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Descriptive latency statistics over valid samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min_ms: f64,
    pub median_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    /// Sample standard deviation; `None` with fewer than two samples
    pub std_dev_ms: Option<f64>,
}

/// Per-flow figures for one window or aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowWindowStats {
    pub flow_id: usize,
    pub packets: usize,
    pub rate_pps: f64,
    /// Share of the summed rate; absent when no flow had traffic
    pub allocation_pct: Option<f64>,
    pub latency: Option<LatencyStats>,
}

/// All flows within a single window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub index: usize,
    pub window: TimeWindow,
    pub total_packets: usize,
    pub total_rate_pps: f64,
    pub flows: Vec<FlowWindowStats>,
}

impl WindowMetrics {
    /// True when every flow received at least one packet in this window
    pub fn all_flows_active(&self) -> bool {
        !self.flows.is_empty() && self.flows.iter().all(|f| f.packets > 0)
    }
}

/// Expected vs. measured share for one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationComparison {
    pub flow_id: usize,
    pub weight: f64,
    pub expected_pct: f64,
    pub actual_pct: Option<f64>,
    pub diff_pct: Option<f64>,
}

/// Aggregate over a contiguous run of windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalAggregate {
    pub range: TimeWindow,
    pub window_count: usize,
    pub total_packets: usize,
    pub total_rate_pps: f64,
    pub flows: Vec<FlowWindowStats>,
    pub allocation: Vec<AllocationComparison>,
}

impl IntervalAggregate {
    pub fn flow(&self, flow_id: usize) -> Option<&FlowWindowStats> {
        self.flows.iter().find(|f| f.flow_id == flow_id)
    }
}

/// Output of the window aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub window_size_sec: f64,
    pub windows: Vec<WindowMetrics>,
    pub overall: IntervalAggregate,
    /// Longest run of windows with every flow active, if any
    pub steady_state: Option<IntervalAggregate>,
}

/// Unmatched receive events of one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapDetail {
    /// All failures are missing send records, as expected with log thinning
    ThinningSummary { unmatched: usize },
    /// Individually listed failures, capped
    Enumerated {
        total: usize,
        failures: Vec<FailureRecord>,
        truncated: usize,
    },
}

/// Bandwidth count vs. latency-sample count for one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConsistency {
    pub flow_id: usize,
    pub bandwidth_packets: usize,
    pub latency_samples: usize,
    pub gap: i64,
    pub gap_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<GapDetail>,
}

/// Per-flow input overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInputSummary {
    pub flow_id: usize,
    pub weight: f64,
    pub received_packets: usize,
    pub send_records: usize,
    pub send_timestamps: TimestampKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_summary: Option<SendSummary>,
    pub latency_samples: usize,
}

/// Report metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analysis_timestamp: String,
    pub outputs_dir: String,
    pub flow_count: usize,
    pub measurement_start: Timestamp,
    pub measurement_end: Timestamp,
    pub window_size_sec: f64,
    pub latency_ceiling_ms: f64,
    pub payload_marker: String,
}

/// Full analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    pub metadata: AnalysisMetadata,
    pub flows: Vec<FlowInputSummary>,
    pub aggregation: AggregationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<Vec<FlowConsistency>>,
}

/// Sender-side rate figures for one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRateAnalysis {
    pub flow_id: usize,
    pub records: usize,
    pub timestamps: TimestampKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SendSummary>,
    /// Packets spanned by the first and last record (inclusive)
    pub span_packets: u64,
    pub span_sec: f64,
    pub rate_pps: f64,
    pub intervals: Option<IntervalStats>,
}

/// Gaps between consecutive send records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalStats {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub rate_from_mean_pps: f64,
}

/// Output of the send-rate analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRateReport {
    pub analysis_timestamp: String,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub flows: Vec<SendRateAnalysis>,
    pub total_rate_pps: f64,
}
