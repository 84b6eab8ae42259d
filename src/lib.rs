//! # schedprobe - fairness validation for weighted packet schedulers
//!
//! This library drives and analyzes experiments against an external weighted
//! packet scheduler: several emitters send rank-tagged traffic over competing
//! flows, and the analyzer reconstructs per-flow bandwidth share and
//! per-packet latency from the independent sender and receiver logs.
//!
//! ## Architecture
//!
//! - `emitter`: rate-paced and burst packet emission with thinned send logs
//! - `analysis`: log parsing, sequence correlation, window aggregation,
//!   consistency diagnostics and reporting
//! - `config`: type-safe configuration structures and YAML parsing
//! - `config_loader`: configuration file loading and CLI overrides
//! - `utils`: duration parsing
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use schedprobe::analysis::{self, AnalysisOptions};
//! use schedprobe::config::Config;
//! use std::path::Path;
//!
//! let outputs = Path::new("outputs");
//! let specs = Config::default().flow_specs(outputs);
//! let flows = analysis::parse_flows(&specs, "P4 is cool");
//! let report = analysis::analyze_flows(&flows, &AnalysisOptions::default(), "outputs")?;
//! analysis::generate_json_report(&report, &outputs.join("fairness_report.json"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! emitter:
//!   destination: "10.0.2.1"
//!   flow_id: 1
//!   pacing:
//!     mode: pps        # interval / pps / burst
//!     pps: 192
//!   workload:
//!     synthetic:
//!       count: 100000
//!       rank: 2000
//!   duration: 30s
//!   log_every: 10
//!
//! analysis:
//!   window_size: 10s
//!   weights: [20000, 10000, 2000]
//! ```
//!
//! ## Error Handling
//!
//! Library errors are `thiserror` enums per concern (`ValidationError`,
//! `AnalysisError`, `EmitError`); file-level operations and the binaries
//! return `color_eyre` results with context.

pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod emitter;
pub mod utils;
