//! Sender-side rate analysis.
//!
//! Estimates the rate each emitter actually achieved from its own log,
//! independent of what the scheduler let through.

use super::types::*;

/// Restrict records to `[start, end]`; either bound may be open
fn records_in_range(events: &[SendEvent], start: Option<Timestamp>, end: Option<Timestamp>) -> Vec<SendEvent> {
    events
        .iter()
        .filter(|e| start.map_or(true, |s| e.timestamp >= s))
        .filter(|e| end.map_or(true, |t| e.timestamp <= t))
        .copied()
        .collect()
}

/// Rate from first and last record: packets spanned over time spanned.
///
/// Returns `(span_packets, span_sec, rate_pps)`; the rate is zero with fewer
/// than two records.
pub fn rate_from_records(events: &[SendEvent]) -> (u64, f64, f64) {
    match (events.first(), events.last()) {
        (Some(first), Some(last)) if events.len() >= 2 => {
            let packets = last.seq - first.seq + 1;
            let span = last.timestamp - first.timestamp;
            let rate = if span > 0.0 { packets as f64 / span } else { 0.0 };
            (packets, span, rate)
        }
        (Some(_), _) => (1, 0.0, 0.0),
        _ => (0, 0.0, 0.0),
    }
}

/// Gaps between consecutive records, normalized per packet.
///
/// Records from a thinned log are several packets apart, so each gap is
/// divided by the number of packets it spans.
pub fn interval_stats(events: &[SendEvent]) -> Option<IntervalStats> {
    let intervals: Vec<f64> = events
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp) / (pair[1].seq - pair[0].seq) as f64)
        .collect();

    if intervals.is_empty() {
        return None;
    }

    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let min = intervals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = intervals.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(IntervalStats {
        mean_ms: mean * 1000.0,
        min_ms: min * 1000.0,
        max_ms: max * 1000.0,
        rate_from_mean_pps: if mean > 0.0 { 1.0 / mean } else { 0.0 },
    })
}

/// Analyze one flow's sender log, optionally restricted to a time range
pub fn analyze_send_rate(
    flow_id: usize,
    log: &SendLog,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
) -> SendRateAnalysis {
    let records = records_in_range(&log.events, start, end);
    let (span_packets, span_sec, rate_pps) = rate_from_records(&records);

    SendRateAnalysis {
        flow_id,
        records: records.len(),
        timestamps: log.timestamps,
        summary: log.summary.clone(),
        span_packets,
        span_sec,
        rate_pps,
        intervals: interval_stats(&records),
    }
}

/// Sum of per-flow timestamp-method rates
pub fn total_send_rate(analyses: &[SendRateAnalysis]) -> f64 {
    analyses.iter().map(|a| a.rate_pps).sum()
}

/// Analyze every flow's sender log
pub fn send_rate_report(logs: &[(usize, SendLog)], start: Option<Timestamp>, end: Option<Timestamp>) -> SendRateReport {
    let flows: Vec<SendRateAnalysis> = logs
        .iter()
        .map(|(id, log)| analyze_send_rate(*id, log, start, end))
        .collect();

    for flow in flows.iter().filter(|f| f.records == 0) {
        log::warn!("Flow {}: no send records in range", flow.flow_id);
    }

    SendRateReport {
        analysis_timestamp: chrono::Utc::now().to_rfc3339(),
        start_time: start,
        end_time: end,
        total_rate_pps: total_send_rate(&flows),
        flows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thinned(n: u64, every: u64, pps: f64) -> Vec<SendEvent> {
        (1..=n)
            .filter(|s| *s == 1 || s % every == 0 || *s == n)
            .map(|seq| SendEvent { seq, timestamp: 100.0 + (seq - 1) as f64 / pps })
            .collect()
    }

    #[test]
    fn test_rate_from_thinned_records() {
        let events = thinned(101, 10, 25.0);
        let (packets, span, rate) = rate_from_records(&events);
        assert_eq!(packets, 101);
        assert!((span - 4.0).abs() < 1e-9);
        assert!((rate - 25.25).abs() < 1e-9);

        let stats = interval_stats(&events).unwrap();
        assert!((stats.mean_ms - 40.0).abs() < 1e-6);
        assert!((stats.rate_from_mean_pps - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_logs() {
        assert_eq!(rate_from_records(&[]), (0, 0.0, 0.0));
        let one = [SendEvent { seq: 1, timestamp: 5.0 }];
        assert_eq!(rate_from_records(&one), (1, 0.0, 0.0));
        assert!(interval_stats(&one).is_none());
    }

    #[test]
    fn test_time_restricted_analysis() {
        let log = SendLog {
            events: thinned(100, 1, 10.0),
            summary: None,
            timestamps: TimestampKind::Measured,
        };
        // 100.0 .. 109.9; keep records between 102 and 104 inclusive
        let analysis = analyze_send_rate(3, &log, Some(102.0), Some(104.0));
        assert_eq!(analysis.flow_id, 3);
        assert_eq!(analysis.records, 21);
        assert!((analysis.rate_pps - 10.5).abs() < 1e-6);
        assert!((total_send_rate(&[analysis.clone(), analysis]) - 21.0).abs() < 1e-6);
    }

    #[test]
    fn test_report_over_flows() {
        let logs = vec![
            (0, SendLog { events: thinned(101, 10, 20.0), ..Default::default() }),
            (1, SendLog::default()),
        ];
        let report = send_rate_report(&logs, None, None);
        assert_eq!(report.flows.len(), 2);
        assert_eq!(report.flows[1].records, 0);
        assert!((report.total_rate_pps - report.flows[0].rate_pps).abs() < 1e-12);
    }
}
