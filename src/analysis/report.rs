//! Report generation for fairness analysis.
//!
//! Generates both JSON and human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::types::*;

/// Render an epoch timestamp as a UTC wall-clock time
pub fn format_timestamp(ts: Timestamp) -> String {
    match chrono::DateTime::from_timestamp_millis((ts * 1000.0).round() as i64) {
        Some(dt) => dt.format("%H:%M:%S%.3f").to_string(),
        None => format!("{:.3}", ts),
    }
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{:.2}{}", v, suffix),
        None => "N/A".to_string(),
    }
}

fn banner(lines: &mut Vec<String>, title: &str) {
    lines.push("=".repeat(80));
    lines.push(format!("{:^80}", title));
    lines.push("=".repeat(80));
    lines.push(String::new());
}

fn range_line(window: &TimeWindow) -> String {
    format!(
        "{:.2} - {:.2} seconds ({} - {} UTC){}",
        window.start,
        window.end,
        format_timestamp(window.start),
        format_timestamp(window.end),
        if window.end_inclusive { "" } else { " [end exclusive]" }
    )
}

fn latency_lines(lines: &mut Vec<String>, indent: &str, flow_id: usize, stats: Option<&LatencyStats>, theoretical: bool) {
    let Some(stats) = stats else {
        lines.push(format!("{}Flow {}: No latency samples", indent, flow_id));
        return;
    };
    lines.push(format!(
        "{}Flow {}:{}",
        indent,
        flow_id,
        if theoretical { " (theoretical: interpolated send times)" } else { "" }
    ));
    lines.push(format!("{}  Samples: {}", indent, stats.samples));
    lines.push(format!("{}  Min: {:.2} ms", indent, stats.min_ms));
    lines.push(format!("{}  Median: {:.2} ms", indent, stats.median_ms));
    lines.push(format!("{}  Max: {:.2} ms", indent, stats.max_ms));
    lines.push(format!("{}  Mean: {:.2} ms", indent, stats.mean_ms));
    match stats.std_dev_ms {
        Some(std) => lines.push(format!("{}  Std: {:.2} ms", indent, std)),
        None => lines.push(format!("{}  Std: N/A (need >= 2 samples)", indent)),
    }
}

fn aggregate_lines(lines: &mut Vec<String>, aggregate: &IntervalAggregate, report: &FairnessReport) {
    lines.push(format!("Time range: {}", range_line(&aggregate.range)));
    lines.push(format!("Windows: {}", aggregate.window_count));
    lines.push("-".repeat(60));
    for flow in &aggregate.flows {
        lines.push(format!(
            "Flow {}: {} packets, {:.2} pps",
            flow.flow_id, flow.packets, flow.rate_pps
        ));
    }

    if aggregate.total_rate_pps > 0.0 {
        lines.push(String::new());
        lines.push(format!(
            "Total: {} packets, {:.2} pps",
            aggregate.total_packets, aggregate.total_rate_pps
        ));
        let weights: Vec<String> = aggregate.allocation.iter().map(|a| format!("{}", a.weight)).collect();
        lines.push(format!("Expected allocation (weights {}):", weights.join(":")));
        for cmp in &aggregate.allocation {
            lines.push(format!(
                "  Flow {}: {:.2}% (actual: {}, diff: {})",
                cmp.flow_id,
                cmp.expected_pct,
                fmt_opt(cmp.actual_pct, "%"),
                fmt_opt(cmp.diff_pct, "%")
            ));
        }
    } else {
        lines.push("No traffic in range; allocation not computed".to_string());
    }

    lines.push(String::new());
    lines.push("Latency Statistics:".to_string());
    for flow in &aggregate.flows {
        latency_lines(lines, "  ", flow.flow_id, flow.latency.as_ref(), is_theoretical(report, flow.flow_id));
    }
    lines.push(String::new());
}

fn is_theoretical(report: &FairnessReport, flow_id: usize) -> bool {
    report
        .flows
        .iter()
        .any(|f| f.flow_id == flow_id && f.send_timestamps == TimestampKind::Interpolated)
}

/// Generate JSON report
pub fn generate_json_report<T: serde::Serialize>(report: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Render the human-readable text report
pub fn render_text_report(report: &FairnessReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    banner(&mut lines, "SCHEDULER FAIRNESS ANALYSIS");

    lines.push(format!("Analysis Date: {}", report.metadata.analysis_timestamp));
    lines.push(format!("Outputs Directory: {}", report.metadata.outputs_dir));
    lines.push(format!("Flows: {}", report.metadata.flow_count));
    lines.push(format!(
        "Measurement window: {:.2} - {:.2} seconds",
        report.metadata.measurement_start, report.metadata.measurement_end
    ));
    lines.push(format!("Window size: {} seconds", report.metadata.window_size_sec));
    lines.push(format!("Latency ceiling: {} ms", report.metadata.latency_ceiling_ms));
    lines.push(String::new());

    for flow in &report.flows {
        lines.push(format!(
            "Flow {} (weight {}): received {} packets, {} send records ({} timestamps), {} latency samples",
            flow.flow_id,
            flow.weight,
            flow.received_packets,
            flow.send_records,
            flow.send_timestamps,
            flow.latency_samples
        ));
        if let Some(total) = flow.sender_summary.as_ref().and_then(|s| s.total_packets) {
            lines.push(format!("  Sender summary: {} packets", total));
        }
    }
    lines.push(String::new());

    banner(&mut lines, "PER-WINDOW STATISTICS");
    for window in &report.aggregation.windows {
        lines.push(format!("Window {}: {}", window.index, range_line(&window.window)));
        lines.push("-".repeat(60));
        for flow in &window.flows {
            let latency = match &flow.latency {
                Some(l) => format!(
                    " | Latency: {} samples, median={:.2} ms, mean={:.2} ms",
                    l.samples, l.median_ms, l.mean_ms
                ),
                None => " | Latency: No samples".to_string(),
            };
            lines.push(format!(
                "  Flow {}: {} packets, {:.2} pps, share {}{}",
                flow.flow_id,
                flow.packets,
                flow.rate_pps,
                fmt_opt(flow.allocation_pct, "%"),
                latency
            ));
        }
        if window.total_rate_pps > 0.0 {
            lines.push(format!(
                "  Total: {} packets, {:.2} pps",
                window.total_packets, window.total_rate_pps
            ));
        }
        lines.push(String::new());
    }

    banner(&mut lines, "STEADY STATE (ALL FLOWS ACTIVE)");
    match &report.aggregation.steady_state {
        Some(steady) => aggregate_lines(&mut lines, steady, report),
        None => {
            lines.push("No window had traffic from every flow.".to_string());
            lines.push(String::new());
        }
    }

    banner(&mut lines, "ENTIRE MEASUREMENT WINDOW");
    aggregate_lines(&mut lines, &report.aggregation.overall, report);

    if let Some(ref consistency) = report.consistency {
        banner(&mut lines, "CONSISTENCY CHECK");
        for check in consistency {
            lines.push(format!("Flow {}:", check.flow_id));
            lines.push(format!("  Bandwidth measurement: {} packets", check.bandwidth_packets));
            lines.push(format!("  Latency measurement: {} packets", check.latency_samples));
            lines.push(format!(
                "  Difference: {} packets ({})",
                check.gap,
                fmt_opt(check.gap_pct, "%")
            ));

            match &check.detail {
                Some(GapDetail::ThinningSummary { unmatched }) => {
                    lines.push(format!(
                        "  {} packets have no send timestamp (expected with log thinning)",
                        unmatched
                    ));
                }
                Some(GapDetail::Enumerated { total, failures, truncated }) => {
                    lines.push(format!("  {} packet(s) failed to get latency", total));
                    for (i, fail) in failures.iter().enumerate() {
                        lines.push(format!(
                            "    [{}] recv_idx={}, recv_time={:.6}",
                            i + 1,
                            fail.receive_index,
                            fail.arrival
                        ));
                        if let (Some(send), Some(latency)) = (fail.send_time, fail.latency_ms) {
                            lines.push(format!("        send_time={:.6}, latency_ms={:.2}", send, latency));
                        }
                        lines.push(format!("        reason: {}", fail.reason));
                    }
                    if *truncated > 0 {
                        lines.push(format!("    ... and {} more", truncated));
                    }
                }
                None => {}
            }
            lines.push(String::new());
        }
    }

    lines.push("=".repeat(80));
    lines.join("\n")
}

/// Generate human-readable text report
pub fn generate_text_report(report: &FairnessReport, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_text_report(report))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &FairnessReport) {
    println!("\n=== SCHEDULER FAIRNESS SUMMARY ===\n");
    println!("Flows: {}", report.metadata.flow_count);
    println!("Windows: {}", report.aggregation.windows.len());

    let (title, aggregate) = match &report.aggregation.steady_state {
        Some(steady) => ("Steady state", steady),
        None => ("Entire window", &report.aggregation.overall),
    };
    println!("\n{} allocation:", title);
    for cmp in &aggregate.allocation {
        println!(
            "  Flow {}: expected {:.2}%, actual {}, diff {}",
            cmp.flow_id,
            cmp.expected_pct,
            fmt_opt(cmp.actual_pct, "%"),
            fmt_opt(cmp.diff_pct, "%")
        );
    }

    if let Some(ref consistency) = report.consistency {
        let gaps: Vec<String> = consistency
            .iter()
            .filter(|c| c.gap != 0)
            .map(|c| format!("flow {} ({})", c.flow_id, c.gap))
            .collect();
        if !gaps.is_empty() {
            println!("\nLatency gaps: {}", gaps.join(", "));
        }
    }

    println!();
}

/// Print sender-side rate analysis to stdout
pub fn print_send_rates(analyses: &[SendRateAnalysis]) {
    println!("{}", "=".repeat(60));
    println!("Actual Sending Rate Analysis");
    println!("{}", "=".repeat(60));

    for a in analyses {
        println!("\nFlow {} ({} timestamps):", a.flow_id, a.timestamps);
        println!("{}", "-".repeat(60));
        if a.records == 0 {
            println!("  No timestamps found in log");
            continue;
        }

        if let Some(summary) = &a.summary {
            println!("  Summary method:");
            if let Some(total) = summary.total_packets {
                println!("    Total packets: {}", total);
            }
            if let Some(time) = summary.total_time_sec {
                println!("    Total time: {:.2} seconds", time);
            }
            if let Some(rate) = summary.average_rate {
                println!("    Average rate: {:.2} packets/sec", rate);
            }
        }

        println!("  Timestamp method:");
        println!("    Records: {}", a.records);
        println!("    Packet span: {}", a.span_packets);
        println!("    Duration: {:.2} seconds", a.span_sec);
        println!("    Average rate: {:.2} packets/sec", a.rate_pps);

        if let Some(iv) = &a.intervals {
            println!("  Interval analysis:");
            println!("    Average interval: {:.2} ms", iv.mean_ms);
            println!("    Min interval: {:.2} ms", iv.min_ms);
            println!("    Max interval: {:.2} ms", iv.max_ms);
            println!("    Rate from interval: {:.2} packets/sec", iv.rate_from_mean_pps);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "Total send rate (all flows): {:.2} packets/sec",
        super::send_rate::total_send_rate(analyses)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::pipeline::{analyze_flows, AnalysisOptions};

    #[test]
    fn test_format_timestamp() {
        // 2000-01-01 04:00:05.464 UTC
        assert_eq!(format_timestamp(946684800.0 + 14405.464), "04:00:05.464");
    }

    #[test]
    fn test_text_report_sections() {
        let mut flow = FlowData::new(0, 1.0);
        flow.receives = (0..20).map(|i| ReceiveEvent { timestamp: 50.0 + i as f64 * 0.5 }).collect();
        flow.send_log.events = vec![SendEvent { seq: 1, timestamp: 49.9 }];
        flow.send_log.timestamps = TimestampKind::Interpolated;

        let report = analyze_flows(&[flow], &AnalysisOptions::default(), "outputs").unwrap();
        let text = render_text_report(&report);
        assert!(text.contains("STEADY STATE"));
        assert!(text.contains("CONSISTENCY CHECK"));
        assert!(text.contains("theoretical"));
        assert!(text.contains("19 packet(s) failed to get latency"));
    }

    #[test]
    fn test_json_report_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let analysis = SendRateAnalysis {
            flow_id: 0,
            records: 0,
            timestamps: TimestampKind::Measured,
            summary: None,
            span_packets: 0,
            span_sec: 0.0,
            rate_pps: 0.0,
            intervals: None,
        };
        generate_json_report(&vec![analysis], &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"flow_id\": 0"));
    }
}
