//! Time windowing and bandwidth-share aggregation.
//!
//! The measurement interval is sliced into fixed windows. Each window gets a
//! per-flow tally (packet count and valid latencies); the whole-interval and
//! steady-state aggregates are folds over those tallies, so the sum of window
//! counts always equals the interval count.

use std::ops::Range;

use super::types::*;

/// Errors raised while setting up an aggregation
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AnalysisError {
    #[error("Window size must be positive, got {0}")]
    InvalidWindowSize(f64),
    #[error("No packets found in any receiver log")]
    NoData,
    #[error("Measurement window is empty or unbounded (start {start:.3}, end {end:.3})")]
    EmptyInterval { start: Timestamp, end: Timestamp },
}

/// Both bounds finite and `start < end`
fn is_bounded_interval(start: Timestamp, end: Timestamp) -> bool {
    start.is_finite() && end.is_finite() && start < end
}

/// Trailing slivers within a few ulps of `end` are folded into the last window
fn reaches_end(window_end: f64, end: f64) -> bool {
    window_end >= end || end - window_end <= 4.0 * f64::EPSILON * end.abs().max(1.0)
}

/// Create contiguous windows spanning `[start, end]`.
///
/// All windows are half-open except the last, which is end-inclusive and
/// clipped to `end`.
pub fn create_time_windows(start: Timestamp, end: Timestamp, window_size_sec: f64) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    if !(window_size_sec > 0.0) || !is_bounded_interval(start, end) {
        return windows;
    }

    let mut current = start;
    let mut index = 0usize;
    while current < end {
        let mut window_end = start + (index + 1) as f64 * window_size_sec;
        if reaches_end(window_end, end) {
            window_end = end;
        }
        windows.push(TimeWindow {
            start: current,
            end: window_end,
            end_inclusive: window_end == end,
            label: Some(format!("window_{}", index + 1)),
        });
        current = window_end;
        index += 1;
    }

    windows
}

/// Pick the measurement interval.
///
/// Without overrides the interval runs from the earliest send or receive
/// timestamp (plus `start_offset`) to the latest receive timestamp.
pub fn resolve_measurement_range(
    flows: &[FlowData],
    start_override: Option<Timestamp>,
    end_override: Option<Timestamp>,
    start_offset: f64,
) -> Result<(Timestamp, Timestamp), AnalysisError> {
    let last_receive = flows
        .iter()
        .flat_map(|f| f.receives.iter().map(|r| r.timestamp))
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));

    let Some(last_receive) = last_receive else {
        return Err(AnalysisError::NoData);
    };

    let earliest = flows
        .iter()
        .flat_map(|f| {
            f.receives
                .iter()
                .map(|r| r.timestamp)
                .chain(f.send_log.events.iter().map(|s| s.timestamp))
        })
        .fold(f64::INFINITY, f64::min);

    let start = start_override.unwrap_or(earliest + start_offset);
    let end = end_override.unwrap_or(last_receive);

    if !is_bounded_interval(start, end) {
        return Err(AnalysisError::EmptyInterval { start, end });
    }
    Ok((start, end))
}

/// Count receive events inside a window
pub fn count_in_window(receives: &[ReceiveEvent], window: &TimeWindow) -> usize {
    receives.iter().filter(|r| window.contains(r.timestamp)).count()
}

/// Descriptive statistics; standard deviation needs at least two samples.
pub fn latency_stats(values: &[f64]) -> Option<LatencyStats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    let std_dev = if n > 1 {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(variance.sqrt())
    } else {
        None
    };

    Some(LatencyStats {
        samples: n,
        min_ms: sorted[0],
        median_ms: median,
        max_ms: sorted[n - 1],
        mean_ms: mean,
        std_dev_ms: std_dev,
    })
}

/// Each rate as a percentage of the summed rate; `None` when the sum is zero.
pub fn allocation_shares(rates: &[f64]) -> Vec<Option<f64>> {
    let total: f64 = rates.iter().sum();
    rates
        .iter()
        .map(|r| if total > 0.0 { Some(r / total * 100.0) } else { None })
        .collect()
}

/// Expected allocation percentages from declared weights
pub fn expected_allocation(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return vec![0.0; weights.len()];
    }
    weights.iter().map(|w| w / total * 100.0).collect()
}

/// One flow's raw inputs to the aggregator
#[derive(Debug, Clone, Copy)]
pub struct FlowSeries<'a> {
    pub id: usize,
    pub weight: f64,
    pub receives: &'a [ReceiveEvent],
    /// Valid latency samples, bucketed by arrival time
    pub samples: &'a [LatencySample],
}

#[derive(Debug, Clone, Default)]
struct FlowTally {
    packets: usize,
    latencies: Vec<f64>,
}

impl FlowTally {
    fn merge(&self, other: &FlowTally) -> FlowTally {
        let mut latencies = Vec::with_capacity(self.latencies.len() + other.latencies.len());
        latencies.extend_from_slice(&self.latencies);
        latencies.extend_from_slice(&other.latencies);
        FlowTally {
            packets: self.packets + other.packets,
            latencies,
        }
    }
}

#[derive(Debug, Clone)]
struct WindowTally {
    window: TimeWindow,
    flows: Vec<FlowTally>,
}

fn tally_window(window: &TimeWindow, series: &[FlowSeries<'_>]) -> WindowTally {
    let flows = series
        .iter()
        .map(|s| FlowTally {
            packets: count_in_window(s.receives, window),
            latencies: s
                .samples
                .iter()
                .filter(|sample| window.contains(sample.arrival))
                .map(|sample| sample.latency_ms)
                .collect(),
        })
        .collect();
    WindowTally {
        window: window.clone(),
        flows,
    }
}

fn flow_stats(series: &[FlowSeries<'_>], tallies: &[FlowTally], duration: f64) -> Vec<FlowWindowStats> {
    let rates: Vec<f64> = tallies
        .iter()
        .map(|t| if duration > 0.0 { t.packets as f64 / duration } else { 0.0 })
        .collect();
    let shares = allocation_shares(&rates);

    series
        .iter()
        .zip(tallies)
        .zip(rates.iter().zip(shares))
        .map(|((s, tally), (&rate, share))| FlowWindowStats {
            flow_id: s.id,
            packets: tally.packets,
            rate_pps: rate,
            allocation_pct: share,
            latency: latency_stats(&tally.latencies),
        })
        .collect()
}

fn window_metrics(index: usize, tally: &WindowTally, series: &[FlowSeries<'_>]) -> WindowMetrics {
    let flows = flow_stats(series, &tally.flows, tally.window.duration());
    WindowMetrics {
        index,
        window: tally.window.clone(),
        total_packets: flows.iter().map(|f| f.packets).sum(),
        total_rate_pps: flows.iter().map(|f| f.rate_pps).sum(),
        flows,
    }
}

/// Fold a non-empty run of window tallies into one aggregate
fn fold_tallies(tallies: &[WindowTally], series: &[FlowSeries<'_>], label: &str) -> IntervalAggregate {
    let first = &tallies[0].window;
    let last = &tallies[tallies.len() - 1].window;
    let range = TimeWindow {
        start: first.start,
        end: last.end,
        end_inclusive: last.end_inclusive,
        label: Some(label.to_string()),
    };

    let totals = tallies.iter().fold(vec![FlowTally::default(); series.len()], |acc, tally| {
        acc.iter().zip(&tally.flows).map(|(a, b)| a.merge(b)).collect()
    });

    let flows = flow_stats(series, &totals, range.duration());
    let weights: Vec<f64> = series.iter().map(|s| s.weight).collect();
    let allocation = compare_allocation(series, &flows, &expected_allocation(&weights));

    IntervalAggregate {
        window_count: tallies.len(),
        total_packets: flows.iter().map(|f| f.packets).sum(),
        total_rate_pps: flows.iter().map(|f| f.rate_pps).sum(),
        range,
        flows,
        allocation,
    }
}

fn compare_allocation(
    series: &[FlowSeries<'_>],
    flows: &[FlowWindowStats],
    expected: &[f64],
) -> Vec<AllocationComparison> {
    series
        .iter()
        .zip(flows)
        .zip(expected)
        .map(|((s, f), &expected_pct)| AllocationComparison {
            flow_id: s.id,
            weight: s.weight,
            expected_pct,
            actual_pct: f.allocation_pct,
            diff_pct: f.allocation_pct.map(|a| (a - expected_pct).abs()),
        })
        .collect()
}

/// Longest contiguous run of windows where every flow is active.
///
/// Ties go to the earliest run.
pub fn steady_state_run(windows: &[WindowMetrics]) -> Option<Range<usize>> {
    let mut best: Option<Range<usize>> = None;
    let mut run_start: Option<usize> = None;

    for (i, w) in windows.iter().enumerate() {
        if w.all_flows_active() {
            let start = *run_start.get_or_insert(i);
            let candidate = start..i + 1;
            if best.as_ref().map_or(true, |b| candidate.len() > b.len()) {
                best = Some(candidate);
            }
        } else {
            run_start = None;
        }
    }

    best
}

/// Aggregate all flows over `[start, end]` in windows of `window_size_sec`.
pub fn aggregate_windows(
    series: &[FlowSeries<'_>],
    start: Timestamp,
    end: Timestamp,
    window_size_sec: f64,
) -> Result<AggregationReport, AnalysisError> {
    if !(window_size_sec > 0.0) || !window_size_sec.is_finite() {
        return Err(AnalysisError::InvalidWindowSize(window_size_sec));
    }
    if !is_bounded_interval(start, end) {
        return Err(AnalysisError::EmptyInterval { start, end });
    }

    let tallies: Vec<WindowTally> = create_time_windows(start, end, window_size_sec)
        .iter()
        .map(|w| tally_window(w, series))
        .collect();

    let windows: Vec<WindowMetrics> = tallies
        .iter()
        .enumerate()
        .map(|(i, t)| window_metrics(i + 1, t, series))
        .collect();

    let overall = fold_tallies(&tallies, series, "overall");

    let steady_state = match steady_state_run(&windows) {
        Some(run) => {
            log::debug!("Steady state spans windows {}..={}", run.start + 1, run.end);
            Some(fold_tallies(&tallies[run], series, "steady_state"))
        }
        None => {
            log::warn!("No window has traffic from every flow; steady-state aggregate unavailable");
            None
        }
    };

    Ok(AggregationReport {
        window_size_sec,
        windows,
        overall,
        steady_state,
    })
}
