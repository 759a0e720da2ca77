//! # Event Processing
//!
//! Consumes raw records forwarded by the per-CPU readers and turns them into
//! table rows.
//!
//! ## Event Routing
//!
//! - Exec records → [`Correlator`] → one row per completion
//! - Route records → one row each, no correlation
//!
//! Malformed records are logged and skipped; they never stop the loop.

use std::future::Future;
use std::io::{self, Write};
use std::time::Instant;

use anyhow::Result;
use log::{debug, warn};
use tokio::sync::mpsc;

use super::channel::RawRecord;
use super::correlator::Correlator;
use super::decode::{decode_exec, decode_route};
use super::diagnostics::RunSummary;
use super::event_display::{exec_header, format_exec, format_route, route_header};

/// A table-producing consumer of one event stream
pub trait RecordProcessor {
    /// Write the column header
    ///
    /// # Errors
    /// Returns an error if the output cannot be written
    fn write_header(&mut self) -> io::Result<()>;

    /// Handle one raw record
    ///
    /// # Errors
    /// Only output failures are errors; bad records are skipped
    fn process(&mut self, record: &RawRecord) -> io::Result<()>;

    /// Counters so far (drops excluded, those are counted by the readers)
    fn summary(&self) -> RunSummary;
}

/// Exec stream: correlate fragments, print one line per completed execve
pub struct ExecProcessor<W: Write> {
    out: W,
    correlator: Correlator,
    started: Instant,
    malformed: u64,
    rows: u64,
}

impl<W: Write> ExecProcessor<W> {
    /// Create a processor writing to `out`; TIME(s) counts from `started`
    #[must_use]
    pub fn new(out: W, max_pending: usize, started: Instant) -> Self {
        Self { out, correlator: Correlator::new(max_pending), started, malformed: 0, rows: 0 }
    }

    /// Pids still waiting for their completion
    #[must_use]
    pub fn pending(&self) -> usize {
        self.correlator.pending()
    }

    /// Consume the processor and return the output
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordProcessor for ExecProcessor<W> {
    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", exec_header())
    }

    fn process(&mut self, record: &RawRecord) -> io::Result<()> {
        let exec = match decode_exec(&record.bytes) {
            Ok(exec) => exec,
            Err(e) => {
                warn!("{}: skipping exec record: {e}", record.cpu);
                self.malformed += 1;
                return Ok(());
            }
        };

        if let Some(done) = self.correlator.push(exec) {
            writeln!(self.out, "{}", format_exec(&done, self.started.elapsed()))?;
            self.rows += 1;
        }
        Ok(())
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            evicted: self.correlator.evicted(),
            malformed: self.malformed,
            rows: self.rows,
            ..RunSummary::default()
        }
    }
}

/// Route stream: one line per forwarding-table mutation
pub struct RouteProcessor<W: Write> {
    out: W,
    malformed: u64,
    rows: u64,
}

impl<W: Write> RouteProcessor<W> {
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out, malformed: 0, rows: 0 }
    }

    /// Consume the processor and return the output
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordProcessor for RouteProcessor<W> {
    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", route_header())
    }

    fn process(&mut self, record: &RawRecord) -> io::Result<()> {
        match decode_route(&record.bytes) {
            Ok(route) => {
                writeln!(self.out, "{}", format_route(&route))?;
                self.rows += 1;
            }
            Err(e) => {
                warn!("{}: skipping route record: {e}", record.cpu);
                self.malformed += 1;
            }
        }
        Ok(())
    }

    fn summary(&self) -> RunSummary {
        RunSummary { malformed: self.malformed, rows: self.rows, ..RunSummary::default() }
    }
}

/// Feed records to `processor` until `shutdown` resolves or every reader is gone
///
/// Pending correlation state is not flushed on exit.
///
/// # Errors
/// Returns an error if writing output fails
pub async fn consume<P, F>(
    rx: &mut mpsc::Receiver<RawRecord>,
    processor: &mut P,
    shutdown: F,
) -> Result<()>
where
    P: RecordProcessor,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                debug!("Interrupted, stopping consumer");
                return Ok(());
            }
            record = rx.recv() => match record {
                Some(record) => processor.process(&record)?,
                None => {
                    debug!("All perf readers exited");
                    return Ok(());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use kmon_common::{RouteEvent, ROUTE_INSERT};

    use super::*;
    use crate::domain::CpuId;
    use crate::monitoring::decode::record_bytes;

    #[test]
    fn test_route_processor_skips_short_record() {
        let mut processor = RouteProcessor::new(Vec::new());
        let short = RawRecord { cpu: CpuId(0), bytes: Bytes::from_static(&[1, 2, 3]) };
        processor.process(&short).unwrap();

        let mut event = RouteEvent::zeroed(ROUTE_INSERT);
        event.dst = u32::from_ne_bytes([10, 1, 2, 0]);
        let good = RawRecord { cpu: CpuId(1), bytes: Bytes::from(record_bytes(&event)) };
        processor.process(&good).unwrap();

        let summary = processor.summary();
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.rows, 1);
        let out = String::from_utf8(processor.into_inner()).unwrap();
        assert!(out.trim_end().ends_with("10.1.2.0"));
    }

    #[test]
    fn test_headers_written_once() {
        let mut processor = ExecProcessor::new(Vec::new(), 8, Instant::now());
        processor.write_header().unwrap();
        let out = String::from_utf8(processor.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("TIME(s)"));
    }

    #[tokio::test]
    async fn test_consume_stops_on_shutdown() {
        let (_tx, mut rx) = mpsc::channel::<RawRecord>(4);
        let mut processor = RouteProcessor::new(Vec::new());
        consume(&mut rx, &mut processor, async {}).await.unwrap();
        assert_eq!(processor.summary().rows, 0);
    }
}
