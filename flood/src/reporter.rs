//! Progress lines while a run is going, one summary when it ends.
//!
//! Every number printed here is derived from a [`StatsSnapshot`], the reporter itself only
//! owns the handle of its sampling task.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::signal::{StopCause, StopSignal};
use crate::statistics::{FailureReason, StatsAggregator, StatsSnapshot};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub elapsed: Duration,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    /// Successes per second since the run started.
    pub rps: f64,
    pub success_rate: f64,
}

impl Progress {
    #[must_use]
    pub fn from_snapshot(snap: &StatsSnapshot) -> Self {
        Self {
            elapsed: snap.elapsed,
            total: snap.total,
            success: snap.success,
            failure: snap.failure,
            rps: snap.success_per_second(snap.elapsed),
            success_rate: snap.success_rate(),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1}s] Total: {} | Success: {} | Failed: {} | RPS: {:.2} | Rate: {:.2}%",
            self.elapsed.as_secs_f64(),
            self.total,
            self.success,
            self.failure,
            self.rps,
            self.success_rate
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub cause: StopCause,
    /// Run start to stop.
    pub duration: Duration,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    /// Successes per second over the whole run.
    pub avg_rps: f64,
    pub success_rate: f64,
    /// Most frequent failure first.
    pub failures: Vec<(FailureReason, u64)>,
}

impl Summary {
    /// `snap` is expected to be the snapshot taken at stop time.
    #[must_use]
    pub fn from_snapshot(snap: &StatsSnapshot, cause: StopCause) -> Self {
        Self {
            cause,
            duration: snap.elapsed,
            total: snap.total,
            success: snap.success,
            failure: snap.failure,
            avg_rps: snap.success_per_second(snap.elapsed),
            success_rate: snap.success_rate(),
            failures: snap.failure_breakdown(),
        }
    }
}

/// Where progress and summaries go.
pub trait ReportSink: Send + Sync + 'static {
    fn progress(&self, progress: &Progress);

    fn summary(&self, summary: &Summary);
}

/// Colored output on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn banner(&self, config: &RunConfig) {
        let rule = "=".repeat(RULE_WIDTH);
        let thin = "-".repeat(RULE_WIDTH);
        println!("\n{}", rule.red().bold());
        println!("{}", "                 FLOOD - HTTP LOAD GENERATOR".red().bold());
        println!("{}\n", rule.red().bold());
        println!("{}\n", "WARNING: Use only on authorized targets!".yellow());
        println!("{}", thin.dimmed());
        println!("{}", "Configuration:".white().bold());
        println!("{}{}", "  Target:    ".dimmed(), config.target.yellow());
        println!("{}{}", "  Workers:   ".dimmed(), config.workers.to_string().yellow());
        println!(
            "{}{}",
            "  Duration:  ".dimmed(),
            format!("{}s", config.duration.as_secs()).yellow()
        );
        println!(
            "{}{}",
            "  Delay:     ".dimmed(),
            format!("{}ms", config.delay.as_millis()).yellow()
        );
        println!(
            "{}{}",
            "  Endpoints: ".dimmed(),
            config.endpoints.join(", ").yellow()
        );
        println!("{}\n", thin.dimmed());
        println!("{}\n", "Run started...".green().bold());
        println!("{}\n", rule.dimmed());
    }
}

impl ReportSink for ConsoleSink {
    fn progress(&self, p: &Progress) {
        println!(
            "[{}] Total: {} | Success: {} | Failed: {} | RPS: {} | Rate: {}",
            format!("{:.1}s", p.elapsed.as_secs_f64()).cyan(),
            p.total.to_string().yellow(),
            p.success.to_string().green(),
            p.failure.to_string().red(),
            format!("{:.2}", p.rps).magenta(),
            format!("{:.2}%", p.success_rate).green(),
        );
    }

    fn summary(&self, s: &Summary) {
        let thin = "-".repeat(RULE_WIDTH).dimmed();
        if s.cause == StopCause::Interrupted {
            println!("\n\n{}", "Run interrupted by user".yellow());
        }
        println!("\n{}", "=".repeat(RULE_WIDTH).dimmed());
        println!("{}", "\nRUN COMPLETED".green().bold());
        println!("{thin}");
        println!(
            "Duration:        {}",
            format!("{:.2}s", s.duration.as_secs_f64()).yellow()
        );
        println!("Total Requests:  {}", s.total.to_string().yellow());
        println!(
            "Successful:      {} ({})",
            s.success.to_string().green(),
            format!("{:.2}%", s.success_rate).green()
        );
        println!("Failed:          {}", s.failure.to_string().red());
        println!("Average RPS:     {}", format!("{:.2}", s.avg_rps).magenta());
        if !s.failures.is_empty() {
            println!("{thin}");
            println!("{}", "Error Breakdown:".red().bold());
            for (reason, count) in &s.failures {
                println!("{}", format!("  {reason}: {count}").red());
            }
        }
        println!("{}\n", "=".repeat(RULE_WIDTH).dimmed());
    }
}

pub struct Reporter {
    sink: Arc<dyn ReportSink>,
}

impl Reporter {
    #[must_use]
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    /// Emits one progress line per `interval` until the run stops or the returned handle
    /// is stopped. The first line comes one interval after the call.
    pub fn start_sampling(
        &self,
        interval: Duration,
        stats: Arc<StatsAggregator>,
        stop: StopSignal,
    ) -> Sampling {
        let cancel = CancellationToken::new();
        let sink = self.sink.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    () = stop.stopped() => break,
                    _ = ticker.tick() => sink.progress(&Progress::from_snapshot(&stats.snapshot())),
                }
            }
        });
        Sampling { cancel, handle }
    }

    /// Builds the summary from the stop-time snapshot and hands it to the sink.
    pub fn final_summary(&self, snap: &StatsSnapshot, cause: StopCause) -> Summary {
        let summary = Summary::from_snapshot(snap, cause);
        self.sink.summary(&summary);
        summary
    }
}

/// Handle of a running sampling task.
pub struct Sampling {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sampling {
    /// Stops sampling, no progress line is emitted once this returns.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "progress sampling task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::testing::RecordingSink;

    fn snapshot(success: u64, failure: u64, elapsed: Duration) -> StatsSnapshot {
        let stats = StatsAggregator::new();
        for _ in 0..success {
            stats.record_success();
        }
        for i in 0..failure {
            let reason = if i % 2 == 0 {
                FailureReason::Status(500)
            } else {
                ErrorClass::Timeout.into()
            };
            stats.record_failure(reason);
        }
        StatsSnapshot {
            elapsed,
            ..stats.snapshot()
        }
    }

    #[test]
    fn progress_rates() {
        let p = Progress::from_snapshot(&snapshot(30, 10, Duration::from_secs(2)));
        assert_eq!(p.total, 40);
        assert!((p.rps - 15.0).abs() < f64::EPSILON);
        assert!((p.success_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(
            p.to_string(),
            "[2.0s] Total: 40 | Success: 30 | Failed: 10 | RPS: 15.00 | Rate: 75.00%"
        );
    }

    #[test]
    fn progress_before_any_request() {
        let p = Progress::from_snapshot(&snapshot(0, 0, Duration::ZERO));
        assert_eq!(
            p.to_string(),
            "[0.0s] Total: 0 | Success: 0 | Failed: 0 | RPS: 0.00 | Rate: 0.00%"
        );
    }

    #[test]
    fn summary_sorts_failures() {
        let s = Summary::from_snapshot(
            &snapshot(50, 5, Duration::from_millis(2500)),
            StopCause::DurationElapsed,
        );
        assert_eq!(s.duration, Duration::from_millis(2500));
        assert!((s.avg_rps - 20.0).abs() < f64::EPSILON);
        assert_eq!(
            s.failures,
            vec![
                (FailureReason::Status(500), 3),
                (FailureReason::Transport(ErrorClass::Timeout), 2),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn samples_once_per_interval_until_stopped() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(sink.clone());
        let stats = Arc::new(StatsAggregator::new());
        let stop = StopSignal::new();

        let sampling = reporter.start_sampling(Duration::from_secs(1), stats.clone(), stop.clone());
        stats.record_success();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        sampling.stop().await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let lines = sink.progress_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].elapsed, Duration::from_secs(1));
        assert_eq!(lines[2].elapsed, Duration::from_secs(3));
        assert!(lines.iter().all(|p| p.total == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_ends_with_the_run() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(sink.clone());
        let stop = StopSignal::new();

        let sampling = reporter.start_sampling(
            Duration::from_millis(100),
            Arc::new(StatsAggregator::new()),
            stop.clone(),
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
        stop.stop(StopCause::Interrupted);
        tokio::time::sleep(Duration::from_millis(500)).await;
        sampling.stop().await;

        assert_eq!(sink.progress_lines().len(), 2);
    }
}
