//! Ordinal send/receive correlation.
//!
//! Test packets carry no sequence identifier on the wire, so the receive at
//! arrival position `i` is taken to be packet `i + 1`. Sender logs are
//! usually thinned, which makes most receives unmatched; that is normal and
//! only surfaced when failures are requested.

use std::collections::HashMap;

use super::types::*;

/// Whether unmatched and out-of-range receives should be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationMode {
    /// Keep valid samples only
    SamplesOnly,
    /// Also record a classified failure for every receive without a sample
    Diagnose,
}

/// Result of correlating one flow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    /// Valid samples, in arrival order
    pub samples: Vec<LatencySample>,
    /// Empty unless correlation ran in `Diagnose` mode
    pub failures: Vec<FailureRecord>,
}

impl Correlation {
    pub fn failure_count(&self, reason: FailureReason) -> usize {
        self.failures.iter().filter(|f| f.reason == reason).count()
    }
}

/// True if a latency passes the validity range `[0, ceiling)`
pub fn is_valid_latency(latency_ms: f64, ceiling_ms: f64) -> bool {
    latency_ms >= 0.0 && latency_ms < ceiling_ms
}

/// Correlate a flow's receives against its send records.
pub fn correlate(
    flow_id: usize,
    sends: &[SendEvent],
    receives: &[ReceiveEvent],
    ceiling_ms: f64,
    mode: CorrelationMode,
) -> Correlation {
    let send_time_by_seq: HashMap<u64, Timestamp> =
        sends.iter().map(|s| (s.seq, s.timestamp)).collect();

    let mut result = Correlation::default();
    let diagnose = mode == CorrelationMode::Diagnose;

    for (idx, recv) in receives.iter().enumerate() {
        let seq = idx as u64 + 1;

        let Some(&send_time) = send_time_by_seq.get(&seq) else {
            if diagnose {
                result.failures.push(FailureRecord {
                    receive_index: idx,
                    arrival: recv.timestamp,
                    send_time: None,
                    latency_ms: None,
                    reason: FailureReason::NoMatchingSendRecord,
                });
            }
            continue;
        };

        let latency_ms = (recv.timestamp - send_time) * 1000.0;
        if is_valid_latency(latency_ms, ceiling_ms) {
            result.samples.push(LatencySample {
                flow_id,
                seq,
                arrival: recv.timestamp,
                latency_ms,
            });
        } else if diagnose {
            let reason = if latency_ms < 0.0 {
                FailureReason::NegativeLatency
            } else {
                FailureReason::LatencyOverCeiling
            };
            result.failures.push(FailureRecord {
                receive_index: idx,
                arrival: recv.timestamp,
                send_time: Some(send_time),
                latency_ms: Some(latency_ms),
                reason,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receives(times: &[f64]) -> Vec<ReceiveEvent> {
        times.iter().map(|&timestamp| ReceiveEvent { timestamp }).collect()
    }

    #[test]
    fn test_thinned_sender_log() {
        // 100 receives, one send record every 10th packet
        let recv: Vec<ReceiveEvent> = (0..100)
            .map(|i| ReceiveEvent { timestamp: 1000.0 + i as f64 * 0.01 + 0.005 })
            .collect();
        let sends: Vec<SendEvent> = (1..=10)
            .map(|k| SendEvent { seq: k * 10, timestamp: 1000.0 + (k * 10 - 1) as f64 * 0.01 })
            .collect();

        let quick = correlate(0, &sends, &recv, DEFAULT_LATENCY_CEILING_MS, CorrelationMode::SamplesOnly);
        assert_eq!(quick.samples.len(), 10);
        assert!(quick.failures.is_empty());
        for s in &quick.samples {
            assert_eq!(s.seq % 10, 0);
            assert!((s.latency_ms - 5.0).abs() < 1e-6);
        }

        let full = correlate(0, &sends, &recv, DEFAULT_LATENCY_CEILING_MS, CorrelationMode::Diagnose);
        assert_eq!(full.samples.len(), 10);
        assert_eq!(full.failures.len(), 90);
        assert_eq!(full.failure_count(FailureReason::NoMatchingSendRecord), 90);
    }

    #[test]
    fn test_out_of_range_latencies_are_classified() {
        let sends = vec![
            SendEvent { seq: 1, timestamp: 10.0 },
            SendEvent { seq: 2, timestamp: 20.0 },
            SendEvent { seq: 3, timestamp: 30.0 },
        ];
        // seq 1 arrives before it was sent, seq 3 exceeds a 5 s ceiling
        let recv = receives(&[9.5, 20.2, 36.0]);

        let result = correlate(7, &sends, &recv, 5_000.0, CorrelationMode::Diagnose);
        assert_eq!(result.samples.len(), 1);
        assert_eq!(result.samples[0].flow_id, 7);
        assert_eq!(result.samples[0].seq, 2);
        assert_eq!(result.failures[0].reason, FailureReason::NegativeLatency);
        assert_eq!(result.failures[0].receive_index, 0);
        assert_eq!(result.failures[1].reason, FailureReason::LatencyOverCeiling);
        assert_eq!(result.failures[1].send_time, Some(30.0));

        let quiet = correlate(7, &sends, &recv, 5_000.0, CorrelationMode::SamplesOnly);
        assert_eq!(quiet.samples.len(), 1);
        assert!(quiet.failures.is_empty());
    }

    #[test]
    fn test_ceiling_is_exclusive() {
        assert!(is_valid_latency(0.0, 100.0));
        assert!(is_valid_latency(99.999, 100.0));
        assert!(!is_valid_latency(100.0, 100.0));
        assert!(!is_valid_latency(-0.001, 100.0));
    }
}
