//! Fairness analysis for weighted scheduler experiments.
//!
//! This module reconstructs per-flow bandwidth shares and per-packet latency
//! from sender and receiver logs, and checks the two measurements against
//! each other.

pub mod types;
pub mod log_parser;
pub mod correlate;
pub mod time_window;
pub mod diagnostics;
pub mod send_rate;
pub mod pipeline;
pub mod report;

pub use types::*;
pub use log_parser::{parse_flows, parse_receive_flows, parse_receive_log, parse_send_log, parse_send_logs};
pub use correlate::{correlate, CorrelationMode};
pub use time_window::{aggregate_windows, AnalysisError};
pub use diagnostics::check_consistency;
pub use send_rate::{analyze_send_rate, send_rate_report};
pub use pipeline::{analyze_flows, AnalysisOptions};
pub use report::{generate_json_report, generate_text_report};
