//! Per-CPU perf buffer readers
//!
//! Each online CPU has its own perf buffer. One reader task per CPU drains it
//! and forwards raw records into a single channel, so everything downstream runs
//! on one consumer with no shared state. The kernel drops records when a CPU's
//! buffer is full; the reader only learns the count, which goes into
//! [`DropCounter`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use aya::maps::perf::{AsyncPerfEventArray, AsyncPerfEventArrayBuffer};
use aya::maps::{Map, MapData};
use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::CpuId;

/// Buffers handed to one `read_events` call
const READ_BATCH: usize = 16;

/// Records buffered between readers and the consumer
pub const CHANNEL_CAPACITY: usize = 4096;

/// One record as it left a CPU's perf buffer
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub cpu: CpuId,
    pub bytes: Bytes,
}

/// Running total of records the kernel dropped on full buffers
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, lost: u64) {
        self.0.fetch_add(lost, Ordering::Relaxed);
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Open one perf buffer per CPU on `map` and start a reader task for each
///
/// Returns the receiving end of the shared channel and the reader handles.
///
/// # Errors
/// Returns an error if the map is not a perf event array or a buffer fails to open
pub fn spawn_readers(
    map: Map,
    cpus: &[CpuId],
    pages: usize,
    record_size: usize,
    drops: &DropCounter,
) -> Result<(mpsc::Receiver<RawRecord>, Vec<JoinHandle<()>>)> {
    let mut array = AsyncPerfEventArray::try_from(map).context("Not a perf event array")?;
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let mut handles = Vec::with_capacity(cpus.len());

    for &cpu in cpus {
        let buf = array
            .open(cpu.0, Some(pages))
            .with_context(|| format!("Failed to open perf buffer on {cpu}"))?;
        handles.push(tokio::spawn(read_cpu(cpu, buf, tx.clone(), drops.clone(), record_size)));
    }

    debug!("Started {} perf readers ({pages} pages each)", handles.len());
    Ok((rx, handles))
}

async fn read_cpu(
    cpu: CpuId,
    mut buf: AsyncPerfEventArrayBuffer<MapData>,
    tx: mpsc::Sender<RawRecord>,
    drops: DropCounter,
    record_size: usize,
) {
    let mut buffers: Vec<BytesMut> =
        (0..READ_BATCH).map(|_| BytesMut::with_capacity(record_size)).collect();

    loop {
        let events = match buf.read_events(&mut buffers).await {
            Ok(events) => events,
            Err(e) => {
                warn!("{cpu}: perf buffer read failed: {e}");
                return;
            }
        };

        if events.lost > 0 {
            debug!("{cpu}: {} records lost", events.lost);
            drops.add(events.lost as u64);
        }

        for raw in buffers.iter_mut().take(events.read) {
            let record = RawRecord { cpu, bytes: raw.split().freeze() };
            if tx.send(record).await.is_err() {
                // consumer has exited
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_counter_shared_between_clones() {
        let drops = DropCounter::new();
        let reader_a = drops.clone();
        let reader_b = drops.clone();
        reader_a.add(3);
        reader_b.add(4);
        assert_eq!(drops.total(), 7);
    }

    #[test]
    fn test_drop_counter_starts_at_zero() {
        assert_eq!(DropCounter::default().total(), 0);
    }
}
