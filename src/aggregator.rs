use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::types::{ProbeOutcome, ScanSummary};

/// Live open/closed counters, readable while a scan is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tallies {
    pub open: usize,
    pub closed: usize,
}

/// Collects probe outcomes from many concurrent probe tasks.
///
/// Counters are atomics; the mutex guards only the push of an open outcome, so
/// `tallies()` never waits on a writer.
#[derive(Debug)]
pub struct ResultAggregator {
    total: usize,
    open_count: AtomicUsize,
    closed_count: AtomicUsize,
    open_ports: Mutex<Vec<ProbeOutcome>>,
    finalized: AtomicBool,
}

impl ResultAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            open_count: AtomicUsize::new(0),
            closed_count: AtomicUsize::new(0),
            open_ports: Mutex::new(Vec::new()),
            finalized: AtomicBool::new(false),
        }
    }

    /// Record one outcome.
    ///
    /// # Panics
    /// If called after [`finalize`](Self::finalize).
    pub fn record(&self, outcome: ProbeOutcome) {
        assert!(
            !self.finalized.load(Ordering::Acquire),
            "outcome for port {} recorded after the scan summary was finalized",
            outcome.port
        );

        if outcome.is_open {
            self.open_ports
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(outcome);
            self.open_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.closed_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn tallies(&self) -> Tallies {
        Tallies {
            open: self.open_count.load(Ordering::Relaxed),
            closed: self.closed_count.load(Ordering::Relaxed),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Build the immutable summary. Open ports come back sorted by port.
    ///
    /// # Panics
    /// If called twice.
    pub fn finalize(&self) -> ScanSummary {
        let already = self.finalized.swap(true, Ordering::AcqRel);
        assert!(!already, "scan summary finalized twice");

        let mut open_ports = std::mem::take(
            &mut *self
                .open_ports
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        open_ports.sort_by_key(|o| o.port);
        let tallies = self.tallies();

        ScanSummary {
            total_ports: self.total,
            open_count: tallies.open,
            closed_count: tallies.closed,
            open_ports,
        }
    }
}
