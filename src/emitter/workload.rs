//! Rank workloads and packet budgets.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use super::EmitError;
use crate::config::{ValidationError, WorkloadSource};

/// Parse one rank per line; blank lines are ignored
pub fn parse_ranks<R: BufRead>(reader: R) -> Result<Vec<i32>, String> {
    let mut ranks = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("line {}: {}", lineno + 1, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let rank = trimmed
            .parse::<i32>()
            .map_err(|_| format!("line {}: invalid rank '{}'", lineno + 1, trimmed))?;
        ranks.push(rank);
    }
    Ok(ranks)
}

/// Load a rank file
pub fn load_rank_file(path: &Path) -> Result<Vec<i32>, EmitError> {
    let file = File::open(path).map_err(|e| EmitError::Workload {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_ranks(BufReader::new(file)).map_err(|reason| EmitError::Workload {
        path: path.to_path_buf(),
        reason,
    })
}

/// Materialize the rank of every packet the workload describes
pub fn load_workload(source: &WorkloadSource) -> Result<Vec<i32>, EmitError> {
    match source {
        WorkloadSource::File(path) => {
            let ranks = load_rank_file(path)?;
            log::info!("Loaded {} ranks from {}", ranks.len(), path.display());
            Ok(ranks)
        }
        WorkloadSource::Synthetic { count, rank } => {
            let count = usize::try_from(*count).map_err(|_| {
                ValidationError::InvalidEmitter(format!("synthetic packet count {} is too large", count))
            })?;
            Ok(vec![*rank; count])
        }
    }
}

/// Number of packets to send: the smallest of the workload length, the
/// packet limit, and `duration * rate` when a duration is set.
pub fn compute_budget(workload_len: usize, max_packets: Option<u64>, duration: Option<Duration>, rate_pps: f64) -> u64 {
    let mut budget = workload_len as u64;
    if let Some(max) = max_packets {
        budget = budget.min(max);
    }
    if let Some(duration) = duration {
        let by_time = (duration.as_secs_f64() * rate_pps).floor();
        let by_time = if by_time.is_finite() && by_time > 0.0 { by_time as u64 } else { 0 };
        budget = budget.min(by_time);
    }
    budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_ranks() {
        let ranks = parse_ranks(Cursor::new("2000\n\n  150 \n-3\n")).unwrap();
        assert_eq!(ranks, vec![2000, 150, -3]);

        let err = parse_ranks(Cursor::new("1\nabc\n")).unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_load_workload() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "10\n20\n30").unwrap();
        let ranks = load_workload(&WorkloadSource::File(file.path().to_path_buf())).unwrap();
        assert_eq!(ranks, vec![10, 20, 30]);

        let synthetic = load_workload(&WorkloadSource::Synthetic { count: 4, rank: 2000 }).unwrap();
        assert_eq!(synthetic, vec![2000; 4]);

        let missing = load_workload(&WorkloadSource::File("/nonexistent/ranks.txt".into()));
        assert!(matches!(missing, Err(EmitError::Workload { .. })));
    }

    #[test]
    fn test_budget_is_smallest_limit() {
        assert_eq!(compute_budget(100_000, None, None, 25.0), 100_000);
        assert_eq!(compute_budget(100_000, Some(500), None, 25.0), 500);
        assert_eq!(compute_budget(100_000, None, Some(Duration::from_secs(30)), 192.0), 5760);
        assert_eq!(compute_budget(100, None, Some(Duration::from_secs(30)), 192.0), 100);
        assert_eq!(compute_budget(100_000, Some(10), Some(Duration::from_secs(30)), 192.0), 10);
        assert_eq!(compute_budget(100, None, Some(Duration::from_millis(100)), 5.0), 0);
        assert_eq!(compute_budget(0, None, None, 5.0), 0);
    }
}
