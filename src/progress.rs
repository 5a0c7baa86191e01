use std::time::Instant;

use crate::types::{ProbeOutcome, ProgressSnapshot};

/// Turns a stream of outcomes into progress snapshots.
///
/// Each consumer of the stream keeps its own reporter; the only state is the
/// running count and the start instant.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: usize,
    completed: usize,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self::starting_at(total, Instant::now())
    }

    pub fn starting_at(total: usize, started: Instant) -> Self {
        Self {
            total,
            completed: 0,
            started,
        }
    }

    /// Count one more outcome and return the resulting snapshot.
    pub fn observe(&mut self, _outcome: &ProbeOutcome) -> ProgressSnapshot {
        self.completed += 1;
        self.snapshot()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let percent = if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        };
        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            percent,
            elapsed: self.started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    fn closed(port: u16) -> ProbeOutcome {
        ProbeOutcome::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            false,
            Duration::ZERO,
        )
    }

    #[test]
    fn counts_each_outcome() {
        let mut reporter = ProgressReporter::new(4);
        let first = reporter.observe(&closed(1));
        assert_eq!(first.completed, 1);
        assert_eq!(first.percent, 25.0);

        reporter.observe(&closed(2));
        reporter.observe(&closed(3));
        let last = reporter.observe(&closed(4));
        assert_eq!(last.completed, 4);
        assert_eq!(last.total, 4);
        assert_eq!(last.percent, 100.0);
    }

    #[test]
    fn independent_reporters_keep_their_own_count() {
        let outcome = closed(80);
        let mut a = ProgressReporter::new(10);
        let mut b = ProgressReporter::new(10);
        a.observe(&outcome);
        a.observe(&outcome);
        let snap_b = b.observe(&outcome);
        assert_eq!(a.snapshot().completed, 2);
        assert_eq!(snap_b.completed, 1);
    }

    #[test]
    fn empty_scan_is_complete() {
        assert_eq!(ProgressReporter::new(0).snapshot().percent, 100.0);
    }
}
