//! Paced and burst emission strategies.

use std::io;
use std::time::Duration;

use super::pacing::{sleep_until, CancelFlag, Clock, Pacer};
use super::send_log::SendLogWriter;
use super::transport::{Packet, Transmit};
use crate::analysis::types::TimestampKind;
use crate::config::PacingMode;

/// What to send and when to stop
#[derive(Debug, Clone)]
pub struct EmitPlan {
    /// Already cut to the packet budget
    pub packets: Vec<Packet>,
    pub rate_pps: f64,
    pub interval: Duration,
    pub duration: Option<Duration>,
}

/// Collaborators a strategy runs against
pub struct EmitIo<'a> {
    pub transmit: &'a mut dyn Transmit,
    pub clock: &'a dyn Clock,
    pub log: &'a mut SendLogWriter,
    pub cancel: &'a CancelFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every budgeted packet was attempted
    Exhausted,
    TimeLimit,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmitOutcome {
    pub sent: u64,
    pub errors: u64,
    pub elapsed: Duration,
    pub stop: StopReason,
    pub timestamps: TimestampKind,
}

impl EmitOutcome {
    pub fn average_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.sent as f64 / secs
        } else {
            0.0
        }
    }
}

/// A way of putting a plan on the wire
pub trait EmitStrategy {
    fn name(&self) -> &'static str;

    /// Provenance of the timestamps this strategy records
    fn timestamps(&self) -> TimestampKind;

    fn run(&self, plan: &EmitPlan, io: &mut EmitIo<'_>) -> io::Result<EmitOutcome>;
}

/// One send per deadline, timestamp read right after each send
#[derive(Debug, Default, Clone, Copy)]
pub struct PacedStrategy;

impl EmitStrategy for PacedStrategy {
    fn name(&self) -> &'static str {
        "paced"
    }

    fn timestamps(&self) -> TimestampKind {
        TimestampKind::Measured
    }

    fn run(&self, plan: &EmitPlan, io: &mut EmitIo<'_>) -> io::Result<EmitOutcome> {
        let start = io.clock.now();
        let time_limit = plan.duration.map(|d| start + d);
        let mut pacer = Pacer::new(start, plan.interval);
        let mut sent = 0u64;
        let mut errors = 0u64;
        let mut stop = StopReason::Exhausted;

        for (i, packet) in plan.packets.iter().enumerate() {
            if i > 0 {
                if time_limit.is_some_and(|limit| pacer.next_deadline() >= limit) {
                    stop = StopReason::TimeLimit;
                    break;
                }
                if !sleep_until(io.clock, pacer.next_deadline(), io.cancel) {
                    stop = StopReason::Interrupted;
                    break;
                }
            }
            if io.cancel.is_cancelled() {
                stop = StopReason::Interrupted;
                break;
            }
            if time_limit.is_some_and(|limit| io.clock.now() >= limit) {
                stop = StopReason::TimeLimit;
                break;
            }

            match io.transmit.send(packet) {
                Ok(()) => {
                    sent += 1;
                    io.log.record(sent, io.clock.wall_time())?;
                }
                Err(e) => {
                    errors += 1;
                    if errors == 1 {
                        log::warn!("Send failed: {}", e);
                    } else {
                        log::debug!("Send failed: {}", e);
                    }
                }
            }
            pacer.advance();
        }

        Ok(EmitOutcome {
            sent,
            errors,
            elapsed: io.clock.now() - start,
            stop,
            timestamps: self.timestamps(),
        })
    }
}

/// Whole sequence handed to the transmitter at once.
///
/// Only the wall time before and after the bulk send is known; per-packet
/// timestamps are spread linearly across that span.
#[derive(Debug, Default, Clone, Copy)]
pub struct BurstStrategy;

/// Timestamp of the 1-based `seq` out of `sent` packets spread over `[first, last]`
pub fn interpolate_timestamp(first: f64, last: f64, seq: u64, sent: u64) -> f64 {
    if sent <= 1 {
        return first;
    }
    first + (last - first) * (seq - 1) as f64 / (sent - 1) as f64
}

impl EmitStrategy for BurstStrategy {
    fn name(&self) -> &'static str {
        "burst"
    }

    fn timestamps(&self) -> TimestampKind {
        TimestampKind::Interpolated
    }

    fn run(&self, plan: &EmitPlan, io: &mut EmitIo<'_>) -> io::Result<EmitOutcome> {
        let start = io.clock.now();
        let wall_start = io.clock.wall_time();

        let sent = io
            .transmit
            .send_bulk(&plan.packets, plan.rate_pps, io.clock, io.cancel)?;

        let wall_end = io.clock.wall_time();
        let elapsed = io.clock.now() - start;

        for seq in 1..=sent {
            io.log
                .record(seq, interpolate_timestamp(wall_start, wall_end, seq, sent))?;
        }

        let stop = if io.cancel.is_cancelled() {
            StopReason::Interrupted
        } else {
            StopReason::Exhausted
        };

        // Packets the bulk send skipped without being cancelled failed to send
        let errors = match stop {
            StopReason::Exhausted => (plan.packets.len() as u64).saturating_sub(sent),
            _ => 0,
        };

        Ok(EmitOutcome {
            sent,
            errors,
            elapsed,
            stop,
            timestamps: self.timestamps(),
        })
    }
}

/// Pick the strategy for a pacing mode
pub fn strategy_for(pacing: &PacingMode) -> Box<dyn EmitStrategy> {
    match pacing {
        PacingMode::Burst { .. } => Box::new(BurstStrategy),
        PacingMode::Interval { .. } | PacingMode::Pps { .. } => Box::new(PacedStrategy),
    }
}
