//! Rate-paced traffic emitter.
//!
//! One emitter process drives one flow: it builds the packet sequence from a
//! rank workload, cuts it to the packet budget, sends it with the selected
//! strategy, and writes a thinned send log that the analyzer reads back.

pub mod pacing;
pub mod send_log;
pub mod strategy;
pub mod transport;
pub mod workload;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{EmitterConfig, ValidationError, WorkloadSource};
pub use pacing::{CancelFlag, Clock, Pacer, SystemClock};
pub use send_log::SendLogWriter;
pub use strategy::{strategy_for, EmitIo, EmitOutcome, EmitPlan, EmitStrategy, StopReason};
pub use transport::{Packet, Transmit, UdpTransmitter};

/// Emitter errors
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error(transparent)]
    Config(#[from] ValidationError),
    #[error("Failed to load workload {path:?}: {reason}")]
    Workload { path: PathBuf, reason: String },
    #[error("Failed to resolve destination {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Interrupted: sent {sent} packets")]
    Interrupted { sent: u64 },
}

/// Start banner written to the send log and the console
fn banner(
    config: &EmitterConfig,
    ranks: &[i32],
    budget: u64,
    interval: Duration,
    strategy: &dyn EmitStrategy,
) -> Vec<String> {
    let mut lines = vec![format!(
        "Flow {}: Starting to send traffic to {}:{}",
        config.flow_id, config.destination, config.port
    )];

    match &config.workload {
        WorkloadSource::Synthetic { rank, .. } => lines.push(format!("  Rank value: {} (fixed)", rank)),
        WorkloadSource::File(path) => lines.push(format!(
            "  Ranks: {} ({} entries, first {})",
            path.display(),
            ranks.len(),
            ranks.first().copied().unwrap_or_default()
        )),
    }

    lines.push(format!(
        "  Send rate: {:.3} ms/packet ({:.2} packets/sec, {})",
        interval.as_secs_f64() * 1000.0,
        config.pacing.rate_pps(),
        strategy.name()
    ));

    match config.duration {
        Some(d) => lines.push(format!(
            "  Duration: {} seconds, packet budget {}",
            d.as_secs_f64(),
            budget
        )),
        None => lines.push(format!("  Packet budget: {}", budget)),
    }
    lines
}

/// Validate, plan and send one flow against the given collaborators.
///
/// The send log is always flushed with its summary before returning. An
/// interrupted run reports [`EmitError::Interrupted`] with the partial count.
pub fn emit(config: &EmitterConfig, io: &mut EmitIo<'_>) -> Result<EmitOutcome, EmitError> {
    config.validate()?;

    let ranks = workload::load_workload(&config.workload)?;
    let rate = config.pacing.rate_pps();
    let interval = config.pacing.nominal_interval()?;
    let budget = workload::compute_budget(ranks.len(), config.max_packets, config.duration, rate);
    if budget == 0 {
        return Err(ValidationError::InvalidEmitter(format!(
            "packet budget is zero (workload {} packets, rate {:.2} packets/sec)",
            ranks.len(),
            rate
        ))
        .into());
    }

    let strategy = strategy_for(&config.pacing);
    let lines = banner(config, &ranks, budget, interval, strategy.as_ref());
    for line in &lines {
        log::info!("{}", line.trim());
    }
    io.log.header(&lines, strategy.timestamps())?;

    let plan = EmitPlan {
        packets: ranks
            .iter()
            .take(budget as usize)
            .enumerate()
            .map(|(i, &rank)| Packet::new(i as u64 + 1, rank, &config.payload_marker))
            .collect(),
        rate_pps: rate,
        interval,
        duration: config.duration,
    };

    let outcome = strategy.run(&plan, io)?;

    match outcome.stop {
        StopReason::TimeLimit => log::info!(
            "Reached time limit: {} seconds",
            config.duration.map(|d| d.as_secs_f64()).unwrap_or_default()
        ),
        StopReason::Exhausted if outcome.sent + outcome.errors >= budget && (budget as usize) < ranks.len() => {
            log::info!("Reached maximum packet limit: {}", budget)
        }
        _ => {}
    }
    if outcome.errors > 0 {
        log::warn!("Flow {}: {} send(s) failed", config.flow_id, outcome.errors);
    }

    let interrupted = outcome.stop == StopReason::Interrupted;
    io.log
        .finish(config.flow_id, outcome.sent, outcome.elapsed, interrupted)?;

    log::info!(
        "Flow {}: sent {} packets in {:.2} s ({:.2} packets/sec)",
        config.flow_id,
        outcome.sent,
        outcome.elapsed.as_secs_f64(),
        outcome.average_rate()
    );

    if interrupted {
        return Err(EmitError::Interrupted { sent: outcome.sent });
    }
    Ok(outcome)
}

/// Run one flow over UDP with the system clock
pub fn run_emitter(config: &EmitterConfig, cancel: &CancelFlag) -> Result<EmitOutcome, EmitError> {
    config.validate()?;

    let mut transmit =
        UdpTransmitter::connect(&config.destination, config.port).map_err(|source| EmitError::Resolve {
            host: config.destination.clone(),
            source,
        })?;

    let mut log = match &config.log_file {
        Some(path) => SendLogWriter::to_file(path, config.log_every)?,
        None => SendLogWriter::stdout(config.log_every),
    };
    if !log.is_enabled() {
        log::info!("Flow {}: send log disabled (log_every = 0)", config.flow_id);
    }

    let clock = SystemClock;
    let mut io = EmitIo {
        transmit: &mut transmit,
        clock: &clock,
        log: &mut log,
        cancel,
    };
    emit(config, &mut io)
}
