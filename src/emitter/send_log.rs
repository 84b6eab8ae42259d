//! Sender log writer.
//!
//! Produces the line format read back by the analysis log parser: a start
//! banner, one "sent N packets until now" line per recorded send, and a
//! terminal summary.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::analysis::types::TimestampKind;

/// Thinned send log, written front to back in one run
pub struct SendLogWriter {
    out: Option<Box<dyn Write + Send>>,
    log_every: u64,
    last_recorded: u64,
    last_seen: Option<(u64, f64)>,
}

impl SendLogWriter {
    /// Record packet 1, every `log_every`th packet and the last one;
    /// `log_every == 0` writes nothing at all.
    pub fn new(out: Box<dyn Write + Send>, log_every: u64) -> Self {
        Self {
            out: (log_every > 0).then_some(out),
            log_every,
            last_recorded: 0,
            last_seen: None,
        }
    }

    pub fn stdout(log_every: u64) -> Self {
        Self::new(Box::new(io::stdout()), log_every)
    }

    /// Write to `path`, replacing any log left by an earlier run
    pub fn to_file(path: &Path, log_every: u64) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(BufWriter::new(file)), log_every))
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self.out.as_mut() {
            Some(out) => writeln!(out, "{}", line),
            None => Ok(()),
        }
    }

    /// Start banner plus the timestamp provenance line
    pub fn header(&mut self, banner: &[String], timestamps: TimestampKind) -> io::Result<()> {
        for line in banner {
            self.write_line(line)?;
        }
        self.write_line(&format!("Timestamps: {}", timestamps))
    }

    fn should_record(&self, seq: u64) -> bool {
        seq == 1 || seq % self.log_every == 0
    }

    /// Note a successful send of packet `seq` at wall time `timestamp`
    pub fn record(&mut self, seq: u64, timestamp: f64) -> io::Result<()> {
        self.last_seen = Some((seq, timestamp));
        if self.out.is_none() || !self.should_record(seq) {
            return Ok(());
        }
        self.last_recorded = seq;
        self.write_line(&format!(
            "This host has sent {} packets until now : {:.6}",
            seq, timestamp
        ))
    }

    /// Write the final record if thinning skipped it, the summary, and flush.
    pub fn finish(&mut self, flow_id: usize, sent: u64, elapsed: Duration, interrupted: bool) -> io::Result<()> {
        if let Some((seq, timestamp)) = self.last_seen {
            if seq != self.last_recorded && self.out.is_some() {
                self.last_recorded = seq;
                self.write_line(&format!(
                    "This host has sent {} packets until now : {:.6}",
                    seq, timestamp
                ))?;
            }
        }

        if interrupted {
            self.write_line(&format!("Interrupted: sent {} packets", sent))?;
        }

        let secs = elapsed.as_secs_f64();
        self.write_line("")?;
        self.write_line(&format!("Flow {}: Sending completed", flow_id))?;
        self.write_line(&format!("  Total packets: {}", sent))?;
        self.write_line(&format!("  Total time: {:.2} seconds", secs))?;
        if secs > 0.0 {
            self.write_line(&format!("  Average rate: {:.2} packets/sec", sent as f64 / secs))?;
        }

        match self.out.as_mut() {
            Some(out) => out.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// In-memory sink that stays readable after being boxed into a writer
    #[derive(Clone, Default)]
    pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
