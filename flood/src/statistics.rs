use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use http::StatusCode;
use tokio::time::Instant;

use crate::error::ErrorClass;

/// Key of the failure histogram.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureReason {
    /// A well formed status outside of `[200, 400)`.
    Status(u16),
    Transport(ErrorClass),
    /// A status code outside of the standard `[100, 600)` range.
    UnexpectedStatus,
}

impl FailureReason {
    /// `Ok` for any status in `[200, 400)`.
    pub fn from_status(status: StatusCode) -> Result<(), Self> {
        match status.as_u16() {
            200..=399 => Ok(()),
            code @ 100..=599 => Err(FailureReason::Status(code)),
            _ => Err(FailureReason::UnexpectedStatus),
        }
    }
}

impl From<ErrorClass> for FailureReason {
    fn from(class: ErrorClass) -> Self {
        FailureReason::Transport(class)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(code) => write!(f, "{code}"),
            FailureReason::Transport(class) => f.write_str(class.as_str()),
            FailureReason::UnexpectedStatus => f.write_str("unexpected-status"),
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    success: u64,
    failure: u64,
    reasons: HashMap<FailureReason, u64>,
    sealed: bool,
}

/// Counters shared by every worker of a run.
///
/// The counters and the histogram sit behind one short-lived lock so a success or
/// failure lands together with its share of the total, a reader can never observe
/// `total != success + failure`.
#[derive(Debug)]
pub struct StatsAggregator {
    started_at: Instant,
    tally: Mutex<Tally>,
}

impl StatsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    #[must_use]
    pub fn started_at(started_at: Instant) -> Self {
        Self {
            started_at,
            tally: Mutex::new(Tally::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn start(&self) -> Instant {
        self.started_at
    }

    /// Returns false if the aggregator is already sealed and nothing was counted.
    pub fn record_success(&self) -> bool {
        let mut tally = self.lock();
        if tally.sealed {
            return false;
        }
        tally.success += 1;
        true
    }

    /// Returns false if the aggregator is already sealed and nothing was counted.
    pub fn record_failure(&self, reason: FailureReason) -> bool {
        let mut tally = self.lock();
        if tally.sealed {
            return false;
        }
        tally.failure += 1;
        *tally.reasons.entry(reason).or_insert(0) += 1;
        true
    }

    pub fn record(&self, outcome: Result<(), FailureReason>) -> bool {
        match outcome {
            Ok(()) => self.record_success(),
            Err(reason) => self.record_failure(reason),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let tally = self.lock();
        Self::capture(&tally, self.started_at.elapsed())
    }

    /// Takes the final snapshot, every later record is dropped.
    ///
    /// Sealing twice returns the same counts.
    pub fn seal(&self) -> StatsSnapshot {
        let mut tally = self.lock();
        tally.sealed = true;
        Self::capture(&tally, self.started_at.elapsed())
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    fn capture(tally: &Tally, elapsed: Duration) -> StatsSnapshot {
        StatsSnapshot {
            total: tally.success + tally.failure,
            success: tally.success,
            failure: tally.failure,
            reasons: tally.reasons.clone(),
            elapsed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        // A poisoned tally still holds valid counts, the panicking holder only ever did `+= 1`.
        self.tally
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// A point in time view of a [`StatsAggregator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub reasons: HashMap<FailureReason, u64>,
    /// Time since the run started when the snapshot was taken.
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Percentage of successful requests, `0.0` before any request completed.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64 * 100.0
    }

    /// Successful requests per second over `over`, `0.0` for an empty window.
    #[must_use]
    pub fn success_per_second(&self, over: Duration) -> f64 {
        let secs = over.as_secs_f64();
        if secs > 0.0 {
            self.success as f64 / secs
        } else {
            0.0
        }
    }

    /// Histogram entries, most frequent first. Ties are ordered by key.
    #[must_use]
    pub fn failure_breakdown(&self) -> Vec<(FailureReason, u64)> {
        let mut entries: Vec<_> = self.reasons.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}
