//! Consistency checks between bandwidth counts and latency samples.
//!
//! Every received packet counts towards bandwidth, but only packets whose
//! sequence number made it into the (thinned) sender log produce a latency.
//! For flows with a gap the correlation is re-run with failure recording to
//! explain where the missing samples went.

use super::correlate::{correlate, CorrelationMode};
use super::types::*;

/// Failures listed individually before truncation
pub const MAX_LISTED_FAILURES: usize = 50;

/// Above this many failures, an all-thinning failure set is summarized
pub const THINNING_SUMMARY_THRESHOLD: usize = 20;

/// Summarize or enumerate a flow's failures
pub fn classify_failures(failures: Vec<FailureRecord>) -> GapDetail {
    let total = failures.len();
    let all_thinning = failures
        .iter()
        .all(|f| f.reason == FailureReason::NoMatchingSendRecord);

    if total > THINNING_SUMMARY_THRESHOLD && all_thinning {
        return GapDetail::ThinningSummary { unmatched: total };
    }

    let truncated = total.saturating_sub(MAX_LISTED_FAILURES);
    let mut failures = failures;
    failures.truncate(MAX_LISTED_FAILURES);
    GapDetail::Enumerated {
        total,
        failures,
        truncated,
    }
}

/// Reconcile one flow's bandwidth count with its latency sample count.
///
/// `bandwidth_packets` and `latency_samples` come from the same aggregate,
/// so both refer to the measurement interval.
pub fn check_flow(
    flow: &FlowData,
    bandwidth_packets: usize,
    latency_samples: usize,
    ceiling_ms: f64,
) -> FlowConsistency {
    let gap = bandwidth_packets as i64 - latency_samples as i64;
    let gap_pct = if bandwidth_packets > 0 {
        Some(gap as f64 / bandwidth_packets as f64 * 100.0)
    } else {
        None
    };

    let detail = if gap > 0 {
        log::warn!(
            "Flow {}: {} packets received but latency not calculated",
            flow.id,
            gap
        );
        let rerun = correlate(
            flow.id,
            flow.sends(),
            &flow.receives,
            ceiling_ms,
            CorrelationMode::Diagnose,
        );
        Some(classify_failures(rerun.failures))
    } else {
        if gap < 0 {
            log::warn!(
                "Flow {}: {} more latency samples than received packets",
                flow.id,
                -gap
            );
        }
        None
    };

    FlowConsistency {
        flow_id: flow.id,
        bandwidth_packets,
        latency_samples,
        gap,
        gap_pct,
        detail,
    }
}

/// Run the consistency check for every flow against an aggregate
pub fn check_consistency(
    flows: &[FlowData],
    aggregate: &IntervalAggregate,
    ceiling_ms: f64,
) -> Vec<FlowConsistency> {
    flows
        .iter()
        .map(|flow| {
            let (packets, samples) = aggregate
                .flow(flow.id)
                .map(|s| (s.packets, s.latency.as_ref().map_or(0, |l| l.samples)))
                .unwrap_or((0, 0));
            check_flow(flow, packets, samples, ceiling_ms)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_match(idx: usize) -> FailureRecord {
        FailureRecord {
            receive_index: idx,
            arrival: idx as f64,
            send_time: None,
            latency_ms: None,
            reason: FailureReason::NoMatchingSendRecord,
        }
    }

    #[test]
    fn test_thinning_failures_are_summarized() {
        let failures: Vec<FailureRecord> = (0..90).map(no_match).collect();
        assert_eq!(
            classify_failures(failures),
            GapDetail::ThinningSummary { unmatched: 90 }
        );
    }

    #[test]
    fn test_small_failure_sets_are_listed() {
        let failures: Vec<FailureRecord> = (0..5).map(no_match).collect();
        match classify_failures(failures) {
            GapDetail::Enumerated { total, failures, truncated } => {
                assert_eq!(total, 5);
                assert_eq!(failures.len(), 5);
                assert_eq!(truncated, 0);
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_mixed_failures_are_capped() {
        let mut failures: Vec<FailureRecord> = (0..70).map(no_match).collect();
        failures[3].reason = FailureReason::NegativeLatency;
        failures[3].latency_ms = Some(-4.0);
        match classify_failures(failures) {
            GapDetail::Enumerated { total, failures, truncated } => {
                assert_eq!(total, 70);
                assert_eq!(failures.len(), MAX_LISTED_FAILURES);
                assert_eq!(truncated, 20);
                assert_eq!(failures[3].reason, FailureReason::NegativeLatency);
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_check_flow_without_gap() {
        let flow = FlowData::new(1, 1.0);
        let result = check_flow(&flow, 0, 0, DEFAULT_LATENCY_CEILING_MS);
        assert_eq!(result.gap, 0);
        assert!(result.gap_pct.is_none());
        assert!(result.detail.is_none());
    }

    #[test]
    fn test_check_flow_reruns_correlation() {
        let mut flow = FlowData::new(2, 1.0);
        flow.receives = (0..30).map(|i| ReceiveEvent { timestamp: 10.0 + i as f64 }).collect();
        flow.send_log.events = vec![SendEvent { seq: 1, timestamp: 9.9 }];

        let result = check_flow(&flow, 30, 1, DEFAULT_LATENCY_CEILING_MS);
        assert_eq!(result.gap, 29);
        assert!((result.gap_pct.unwrap() - 96.666).abs() < 0.01);
        assert_eq!(result.detail, Some(GapDetail::ThinningSummary { unmatched: 29 }));
    }
}
