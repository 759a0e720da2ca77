//! Per-pid argv correlation
//!
//! The exec entry probe emits one record per argv fragment and the return probe
//! emits one completion. Fragments are buffered per pid in arrival order and
//! joined when the completion shows up. Missing fragments (lost in the perf
//! buffer) only shorten the joined line; a completion never fails.
//!
//! Entries whose completion is never seen (process killed, record lost) would
//! otherwise live forever, so the number of pending pids is capped and the
//! oldest entry is evicted to make room.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use super::decode::ExecRecord;
use crate::domain::{ExecKind, Pid};

/// Separator placed between fragments
pub const ARG_SEPARATOR: &str = " ";

/// A finished command line, ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedExec {
    pub comm: String,
    pub pid: Pid,
    pub ppid: Pid,
    pub args: String,
}

struct Pending {
    /// Insertion sequence, the eviction order key
    seq: u64,
    fragments: Vec<String>,
}

/// Correlation state for the exec stream
pub struct Correlator {
    pending: HashMap<Pid, Pending>,
    /// seq → pid, oldest first
    order: BTreeMap<u64, Pid>,
    next_seq: u64,
    max_pending: usize,
    evicted: u64,
}

impl Correlator {
    /// Create a correlator holding at most `max_pending` incomplete pids
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            max_pending: max_pending.max(1),
            evicted: 0,
        }
    }

    /// Feed one record; returns the joined line on completion
    pub fn push(&mut self, record: ExecRecord) -> Option<CompletedExec> {
        match record.kind {
            ExecKind::Argument => {
                self.append(record.pid, record.argument);
                None
            }
            ExecKind::Completion => {
                let args = self.complete(record.pid);
                Some(CompletedExec { comm: record.comm, pid: record.pid, ppid: record.ppid, args })
            }
        }
    }

    /// Append a fragment to `pid`'s list, creating it if absent
    pub fn append(&mut self, pid: Pid, fragment: String) {
        if let Some(entry) = self.pending.get_mut(&pid) {
            entry.fragments.push(fragment);
            return;
        }

        if self.pending.len() >= self.max_pending {
            self.evict_oldest();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, pid);
        self.pending.insert(pid, Pending { seq, fragments: vec![fragment] });
    }

    /// Join and release `pid`'s fragments; empty if none were seen
    pub fn complete(&mut self, pid: Pid) -> String {
        match self.pending.remove(&pid) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                entry.fragments.join(ARG_SEPARATOR)
            }
            None => String::new(),
        }
    }

    /// Number of pids waiting for a completion
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of entries dropped to respect the cap
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    fn evict_oldest(&mut self) {
        if let Some((_, pid)) = self.order.pop_first() {
            if let Some(entry) = self.pending.remove(&pid) {
                self.evicted += 1;
                debug!("Evicted {pid} with {} pending fragments", entry.fragments.len());
            }
        }
    }
}
