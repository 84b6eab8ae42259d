//! End-to-end analysis over parsed flows.

use rayon::prelude::*;

use super::correlate::{correlate, CorrelationMode};
use super::diagnostics::check_consistency;
use super::time_window::{aggregate_windows, resolve_measurement_range, AnalysisError, FlowSeries};
use super::types::*;

/// Knobs for a single analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub window_size_sec: f64,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub start_offset_sec: f64,
    pub latency_ceiling_ms: f64,
    pub payload_marker: String,
    /// Correlate send/receive logs; off for bandwidth-only runs
    pub latency: bool,
    pub diagnostics: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            window_size_sec: 10.0,
            start_time: None,
            end_time: None,
            start_offset_sec: 0.0,
            latency_ceiling_ms: DEFAULT_LATENCY_CEILING_MS,
            payload_marker: DEFAULT_PAYLOAD_MARKER.to_string(),
            latency: true,
            diagnostics: true,
        }
    }
}

/// Correlate, aggregate and diagnose a set of parsed flows.
pub fn analyze_flows(
    flows: &[FlowData],
    options: &AnalysisOptions,
    outputs_dir: &str,
) -> Result<FairnessReport, AnalysisError> {
    let (start, end) = resolve_measurement_range(
        flows,
        options.start_time,
        options.end_time,
        options.start_offset_sec,
    )?;
    log::info!(
        "Measurement window: {:.2} - {:.2} ({:.2} s), window size {} s",
        start,
        end,
        end - start,
        options.window_size_sec
    );

    let samples: Vec<Vec<LatencySample>> = if options.latency {
        flows
            .par_iter()
            .map(|flow| {
                correlate(
                    flow.id,
                    flow.sends(),
                    &flow.receives,
                    options.latency_ceiling_ms,
                    CorrelationMode::SamplesOnly,
                )
                .samples
            })
            .collect()
    } else {
        vec![Vec::new(); flows.len()]
    };

    for flow in flows.iter().filter(|f| f.send_log.timestamps == TimestampKind::Interpolated) {
        log::warn!(
            "Flow {}: send timestamps are interpolated; latencies are theoretical",
            flow.id
        );
    }

    let series: Vec<FlowSeries<'_>> = flows
        .iter()
        .zip(&samples)
        .map(|(flow, samples)| FlowSeries {
            id: flow.id,
            weight: flow.weight,
            receives: &flow.receives,
            samples,
        })
        .collect();

    let aggregation = aggregate_windows(&series, start, end, options.window_size_sec)?;

    let consistency = (options.latency && options.diagnostics)
        .then(|| check_consistency(flows, &aggregation.overall, options.latency_ceiling_ms));

    let flow_summaries = flows
        .iter()
        .zip(&samples)
        .map(|(flow, samples)| FlowInputSummary {
            flow_id: flow.id,
            weight: flow.weight,
            received_packets: flow.receives.len(),
            send_records: flow.send_log.events.len(),
            send_timestamps: flow.send_log.timestamps,
            sender_summary: flow.send_log.summary.clone(),
            latency_samples: samples.len(),
        })
        .collect();

    Ok(FairnessReport {
        metadata: AnalysisMetadata {
            analysis_timestamp: chrono::Utc::now().to_rfc3339(),
            outputs_dir: outputs_dir.to_string(),
            flow_count: flows.len(),
            measurement_start: start,
            measurement_end: end,
            window_size_sec: options.window_size_sec,
            latency_ceiling_ms: options.latency_ceiling_ms,
            payload_marker: options.payload_marker.clone(),
        },
        flows: flow_summaries,
        aggregation,
        consistency,
    })
}
