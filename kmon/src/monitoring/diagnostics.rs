//! End-of-run accounting
//!
//! Loss is never surfaced on stdout. These counters only exist to tell the user,
//! on stderr, how much the tables may be missing.

use std::fmt;

/// Counters collected over one monitoring session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records the kernel dropped on full perf buffers
    pub lost: u64,
    /// Incomplete exec entries evicted by the correlation cap
    pub evicted: u64,
    /// Records skipped as undecodable
    pub malformed: u64,
    /// Table rows written
    pub rows: u64,
}

impl RunSummary {
    /// Anything that means the output is incomplete
    #[must_use]
    pub fn has_gaps(&self) -> bool {
        self.lost > 0 || self.evicted > 0 || self.malformed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stats: rows={} lost={} evicted={} malformed={}",
            self.rows, self.lost, self.evicted, self.malformed
        )
    }
}

/// Print the run summary to stderr
pub fn print_summary(summary: &RunSummary) {
    eprintln!("{summary}");
    if summary.lost > 0 {
        eprintln!("warning: perf buffers overflowed, try a larger --buffer-pages");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display() {
        let summary = RunSummary { lost: 3, evicted: 1, malformed: 0, rows: 42 };
        assert_eq!(summary.to_string(), "stats: rows=42 lost=3 evicted=1 malformed=0");
        assert!(summary.has_gaps());
    }

    #[test]
    fn test_clean_run_has_no_gaps() {
        assert!(!RunSummary { rows: 10, ..RunSummary::default() }.has_gaps());
    }
}
