//! Log parsing for sender and receiver hosts.
//!
//! Receiver logs are block-structured: each captured packet starts with a
//! block marker, carries an arrival timestamp, and may or may not contain the
//! test payload. Sender logs carry one line per recorded send plus a terminal
//! summary. Lines that match nothing are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;

use super::types::*;

/// Compiled regex patterns for log parsing
pub struct LogPatterns {
    /// Match: "packet is received at time : 1700000000.123"
    pub received_at: Regex,
    /// Match: "This host has sent 42 packets until now : 1700000000.123"
    pub sent_until_now: Regex,
    /// Match: "Total packets: 1200"
    pub total_packets: Regex,
    /// Match: "Total time: 30.02 seconds"
    pub total_time: Regex,
    /// Match: "Average rate: 39.97 packets/sec"
    pub average_rate: Regex,
    /// Match: "Timestamps: interpolated"
    pub timestamp_kind: Regex,
}

impl LogPatterns {
    pub fn new() -> Self {
        Self {
            received_at: Regex::new(r"received at time : (\d+(?:\.\d+)?)")
                .expect("Invalid received_at regex"),
            sent_until_now: Regex::new(r"sent (\d+) packets until now : (\d+(?:\.\d+)?)")
                .expect("Invalid sent_until_now regex"),
            total_packets: Regex::new(r"Total packets: (\d+)").expect("Invalid total_packets regex"),
            total_time: Regex::new(r"Total time: (\d+(?:\.\d+)?) seconds")
                .expect("Invalid total_time regex"),
            average_rate: Regex::new(r"Average rate: (\d+(?:\.\d+)?) packets/sec")
                .expect("Invalid average_rate regex"),
            timestamp_kind: Regex::new(r"^\s*Timestamps: (measured|interpolated)\s*$")
                .expect("Invalid timestamp_kind regex"),
        }
    }
}

impl Default for LogPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Global patterns instance
pub static PATTERNS: LazyLock<LogPatterns> = LazyLock::new(LogPatterns::new);

/// Line that opens a new captured-packet block in receiver logs
pub const BLOCK_START_MARKER: &str = "got a packet";

/// Open a log for line-wise reading; a missing or unreadable file is logged
/// and reported as `None`.
fn open_log(path: &Path) -> Option<BufReader<File>> {
    if !path.exists() {
        log::warn!("Log file {} not found, treating flow as empty", path.display());
        return None;
    }
    match File::open(path) {
        Ok(file) => Some(BufReader::with_capacity(64 * 1024, file)),
        Err(e) => {
            log::warn!("Failed to open {}: {}, treating flow as empty", path.display(), e);
            None
        }
    }
}

/// Parse a receiver log, keeping only blocks that carry `payload_marker`.
pub fn parse_receive_log(path: &Path, payload_marker: &str) -> Vec<ReceiveEvent> {
    match open_log(path) {
        Some(reader) => scan_receive_lines(reader, payload_marker),
        None => Vec::new(),
    }
}

/// Scan receiver log lines from any buffered reader
pub fn scan_receive_lines<R: BufRead>(reader: R, payload_marker: &str) -> Vec<ReceiveEvent> {
    let mut events = Vec::new();
    let mut pending: Option<Timestamp> = None;

    for line in reader.lines() {
        let Ok(line) = line else { continue };

        if line.contains(BLOCK_START_MARKER) {
            pending = None;
            continue;
        }

        if let Some(caps) = PATTERNS.received_at.captures(&line) {
            pending = caps.get(1).and_then(|m| m.as_str().parse().ok());
            continue;
        }

        if line.contains(payload_marker) {
            if let Some(timestamp) = pending.take() {
                events.push(ReceiveEvent { timestamp });
            }
        }
    }

    events
}

/// Parse a sender log
pub fn parse_send_log(path: &Path) -> SendLog {
    match open_log(path) {
        Some(reader) => scan_send_lines(reader),
        None => SendLog::default(),
    }
}

/// Scan sender log lines from any buffered reader.
///
/// Records whose sequence number does not exceed the previous one are
/// dropped so that sequence numbers stay strictly increasing.
pub fn scan_send_lines<R: BufRead>(reader: R) -> SendLog {
    let mut log = SendLog::default();
    let mut summary = SendSummary::default();

    for line in reader.lines() {
        let Ok(line) = line else { continue };

        if let Some(caps) = PATTERNS.sent_until_now.captures(&line) {
            let seq: Option<u64> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let ts: Option<f64> = caps.get(2).and_then(|m| m.as_str().parse().ok());
            if let (Some(seq), Some(timestamp)) = (seq, ts) {
                let increasing = log.events.last().map_or(true, |last| seq > last.seq);
                if seq > 0 && increasing {
                    log.events.push(SendEvent { seq, timestamp });
                } else {
                    log::debug!("Dropping out-of-order send record {}", seq);
                }
            }
            continue;
        }

        if let Some(caps) = PATTERNS.timestamp_kind.captures(&line) {
            log.timestamps = match caps.get(1).map(|m| m.as_str()) {
                Some("interpolated") => TimestampKind::Interpolated,
                _ => TimestampKind::Measured,
            };
            continue;
        }

        if let Some(caps) = PATTERNS.total_packets.captures(&line) {
            summary.total_packets = caps.get(1).and_then(|m| m.as_str().parse().ok());
        } else if let Some(caps) = PATTERNS.total_time.captures(&line) {
            summary.total_time_sec = caps.get(1).and_then(|m| m.as_str().parse().ok());
        } else if let Some(caps) = PATTERNS.average_rate.captures(&line) {
            summary.average_rate = caps.get(1).and_then(|m| m.as_str().parse().ok());
        }
    }

    if !summary.is_empty() {
        log.summary = Some(summary);
    }
    log
}

/// Parse the sender and receiver logs of every flow in parallel.
///
/// The result is ordered like `specs`.
pub fn parse_flows(specs: &[FlowSpec], payload_marker: &str) -> Vec<FlowData> {
    log::info!("Parsing logs for {} flows in parallel...", specs.len());

    let flows: Vec<FlowData> = specs
        .par_iter()
        .map(|spec| {
            let (send_log, receives) = rayon::join(
                || parse_send_log(&spec.sender_log),
                || parse_receive_log(&spec.receiver_log, payload_marker),
            );
            log::debug!(
                "Parsed flow {}: {} send records, {} receive events",
                spec.id,
                send_log.events.len(),
                receives.len()
            );
            FlowData {
                id: spec.id,
                weight: spec.weight,
                send_log,
                receives,
            }
        })
        .collect();

    for flow in &flows {
        if flow.is_empty() {
            log::warn!("Flow {} has no activity in its logs", flow.id);
        }
        if let Some(total) = flow.send_log.summary.as_ref().and_then(|s| s.total_packets) {
            if total < flow.receives.len() as u64 {
                log::warn!(
                    "Flow {}: receiver saw {} packets but sender reports only {}",
                    flow.id,
                    flow.receives.len(),
                    total
                );
            }
        }
    }

    let total_recv: usize = flows.iter().map(|f| f.receives.len()).sum();
    log::info!("Parsed {} flows, {} total receive events", flows.len(), total_recv);

    flows
}

/// Receiver logs only, for bandwidth analysis; send logs are left empty
pub fn parse_receive_flows(specs: &[FlowSpec], payload_marker: &str) -> Vec<FlowData> {
    let flows: Vec<FlowData> = specs
        .par_iter()
        .map(|spec| {
            let mut flow = FlowData::new(spec.id, spec.weight);
            flow.receives = parse_receive_log(&spec.receiver_log, payload_marker);
            flow
        })
        .collect();

    for flow in flows.iter().filter(|f| f.receives.is_empty()) {
        log::warn!("Flow {} received no test packets", flow.id);
    }
    flows
}

/// Sender logs only, for send-rate analysis
pub fn parse_send_logs(specs: &[FlowSpec]) -> Vec<(usize, SendLog)> {
    specs
        .par_iter()
        .map(|spec| (spec.id, parse_send_log(&spec.sender_log)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const RECEIVER_LOG: &str = "\
got a packet
###[ Ethernet ]###
packet is received at time : 1700000000.100
  load = 'P4 is cool'
got a packet
###[ IPv6 ]###
packet is received at time : 1700000000.200
  nh = ICMPv6
got a packet
packet is received at time : 1700000000.300
  load = 'P4 is cool'
";

    #[test]
    fn test_receive_blocks_require_payload() {
        let events = scan_receive_lines(Cursor::new(RECEIVER_LOG), DEFAULT_PAYLOAD_MARKER);
        assert_eq!(events.len(), 2);
        assert!((events[0].timestamp - 1700000000.1).abs() < 1e-6);
        assert!((events[1].timestamp - 1700000000.3).abs() < 1e-6);
    }

    #[test]
    fn test_block_without_payload_yields_nothing() {
        let log = "got a packet\npacket is received at time : 12.5\nsome other protocol\n";
        assert!(scan_receive_lines(Cursor::new(log), DEFAULT_PAYLOAD_MARKER).is_empty());
    }

    #[test]
    fn test_block_marker_discards_pending_timestamp() {
        // Timestamp from the first block must not leak into the second
        let log = "got a packet\npacket is received at time : 1.0\ngot a packet\nload = 'P4 is cool'\n";
        assert!(scan_receive_lines(Cursor::new(log), DEFAULT_PAYLOAD_MARKER).is_empty());
    }

    #[test]
    fn test_send_log_with_summary() {
        let log = "\
Flow 0: Starting to send traffic to 10.0.2.1:9000
This host has sent 1 packets until now : 100.000
This host has sent 10 packets until now : 100.450
garbage line : not a record
This host has sent 20 packets until now : 100.950

Flow 0: Sending completed
  Total packets: 20
  Total time: 1.00 seconds
  Average rate: 20.00 packets/sec
";
        let parsed = scan_send_lines(Cursor::new(log));
        assert_eq!(parsed.events.len(), 3);
        assert_eq!(parsed.events[1], SendEvent { seq: 10, timestamp: 100.45 });
        assert_eq!(parsed.timestamps, TimestampKind::Measured);
        let summary = parsed.summary.unwrap();
        assert_eq!(summary.total_packets, Some(20));
        assert_eq!(summary.total_time_sec, Some(1.0));
        assert_eq!(summary.average_rate, Some(20.0));
    }

    #[test]
    fn test_send_log_interpolated_and_ordering() {
        let log = "\
Timestamps: interpolated
This host has sent 5 packets until now : 10.0
This host has sent 3 packets until now : 11.0
This host has sent 7 packets until now : 12.0
";
        let parsed = scan_send_lines(Cursor::new(log));
        assert_eq!(parsed.timestamps, TimestampKind::Interpolated);
        let seqs: Vec<u64> = parsed.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![5, 7]);
        assert!(parsed.summary.is_none());
    }

    #[test]
    fn test_missing_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(parse_receive_log(&missing, DEFAULT_PAYLOAD_MARKER).is_empty());
        assert_eq!(parse_send_log(&missing), SendLog::default());
    }

    #[test]
    fn test_partial_flow_parsers() {
        let dir = tempfile::tempdir().unwrap();
        let recv = dir.path().join("receiver_h_r1.txt");
        std::fs::write(
            &recv,
            "got a packet\npacket is received at time : 12.5\nP4 is cool\n",
        )
        .unwrap();
        let send = dir.path().join("sender_h1.txt");
        std::fs::write(&send, "This host has sent 1 packets until now : 12.4\n").unwrap();

        let specs = vec![FlowSpec {
            id: 0,
            weight: 1.0,
            sender_log: send,
            receiver_log: recv,
        }];

        let flows = parse_receive_flows(&specs, DEFAULT_PAYLOAD_MARKER);
        assert_eq!(flows[0].receives.len(), 1);
        assert!(flows[0].send_log.events.is_empty());

        let logs = parse_send_logs(&specs);
        assert_eq!(logs[0].0, 0);
        assert_eq!(logs[0].1.events.len(), 1);
    }
}
