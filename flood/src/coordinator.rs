//! Owns a run: launches the workers, arms the duration timer, listens for an interrupt and
//! drives the stop sequence exactly once.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::Uri;
use tokio::task::{JoinHandle, JoinSet};

use crate::client::Transport;
use crate::config::RunConfig;
use crate::error::{ConfigError, RunError};
use crate::reporter::{ReportSink, Reporter, Summary};
use crate::signal::{StopCause, StopSignal};
use crate::statistics::StatsAggregator;
use crate::worker::{Worker, WorkerTally};

/// Time workers get to notice a duration stop before they are aborted.
pub const DURATION_GRACE: Duration = Duration::from_millis(100);
/// Time workers get to notice an interrupt before they are aborted.
pub const INTERRUPT_GRACE: Duration = Duration::from_millis(50);

/// Start offset of every worker, worker `i` starts `i * stagger` after the run.
#[must_use]
pub fn launch_schedule(workers: usize, stagger: Duration) -> Vec<Duration> {
    (0..workers)
        .map(|i| stagger.saturating_mul(u32::try_from(i).unwrap_or(u32::MAX)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: Summary,
    /// Workers that got past their start offset.
    pub launched: usize,
    /// Workers that wound down on their own within the grace period.
    pub drained: usize,
    /// Workers still running after the grace period.
    pub aborted: usize,
}

pub struct RunHandle {
    stop: StopSignal,
    stats: Arc<StatsAggregator>,
    schedule: Vec<Duration>,
    driver: JoinHandle<RunOutcome>,
}

impl RunHandle {
    #[inline]
    #[must_use]
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    #[inline]
    #[must_use]
    pub fn launch_schedule(&self) -> &[Duration] {
        &self.schedule
    }

    /// Stops the run now. Returns false if it was already stopping.
    pub fn interrupt(&self) -> bool {
        self.stop.stop(StopCause::Interrupted)
    }

    /// Treats the first Ctrl-C of the process as an interrupt of this run.
    pub fn stop_on_ctrl_c(&self) {
        let stop = self.stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = stop.stopped() => {}
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => {
                        if stop.stop(StopCause::Interrupted) {
                            tracing::info!("interrupt received, stopping run");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c"),
                },
            }
        });
    }

    /// Waits for the stop sequence and the grace period to finish.
    pub async fn wait(self) -> Result<RunOutcome, RunError> {
        Ok(self.driver.await?)
    }
}

/// Starts a run on the current tokio runtime.
///
/// Fails only on an invalid `config`, nothing that happens to individual requests ends
/// the run early.
pub fn start<T>(
    config: RunConfig,
    transport: Arc<T>,
    sink: Arc<dyn ReportSink>,
) -> Result<RunHandle, ConfigError>
where
    T: Transport,
{
    let endpoints: Arc<[Uri]> = config.endpoint_uris()?.into();
    let stats = Arc::new(StatsAggregator::new());
    let stop = StopSignal::new();
    let schedule = launch_schedule(config.workers, config.launch_stagger);
    let launched = Arc::new(AtomicUsize::new(0));

    let mut workers = JoinSet::new();
    for (id, offset) in schedule.iter().copied().enumerate() {
        let worker = Worker::new(
            id,
            &config,
            endpoints.clone(),
            transport.clone(),
            stats.clone(),
            stop.clone(),
        );
        let stop = stop.clone();
        let launched = launched.clone();
        workers.spawn(async move {
            tokio::select! {
                biased;
                () = stop.stopped() => None,
                () = tokio::time::sleep(offset) => {
                    launched.fetch_add(1, Ordering::AcqRel);
                    Some(worker.run().await)
                }
            }
        });
    }
    tracing::info!(
        workers = config.workers,
        target = %config.target,
        duration_secs = config.duration.as_secs_f64(),
        "run started"
    );

    let driver = tokio::spawn(drive(
        config,
        Reporter::new(sink),
        stats.clone(),
        stop.clone(),
        workers,
        launched,
    ));
    Ok(RunHandle {
        stop,
        stats,
        schedule,
        driver,
    })
}

async fn drive(
    config: RunConfig,
    reporter: Reporter,
    stats: Arc<StatsAggregator>,
    stop: StopSignal,
    mut workers: JoinSet<Option<WorkerTally>>,
    launched: Arc<AtomicUsize>,
) -> RunOutcome {
    let sampling = reporter.start_sampling(config.report_interval, stats.clone(), stop.clone());

    tokio::select! {
        () = tokio::time::sleep(config.duration) => {
            stop.stop(StopCause::DurationElapsed);
        }
        () = stop.stopped() => {}
    }
    // Whoever set the signal first decides the cause.
    let cause = stop.cause().unwrap_or(StopCause::DurationElapsed);
    let snap = stats.seal();

    sampling.stop().await;
    let summary = reporter.final_summary(&snap, cause);
    tracing::info!(
        %cause,
        total = summary.total,
        success = summary.success,
        failure = summary.failure,
        "run stopped"
    );

    let grace = match cause {
        StopCause::DurationElapsed => DURATION_GRACE,
        StopCause::Interrupted => INTERRUPT_GRACE,
    };
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    let mut drained = 0;
    loop {
        tokio::select! {
            () = &mut deadline => break,
            joined = workers.join_next() => match joined {
                Some(Ok(tally)) => {
                    if tally.is_some() {
                        drained += 1;
                    }
                }
                Some(Err(e)) => tracing::warn!(error = %e, "worker task failed"),
                None => break,
            },
        }
    }
    let aborted = workers.len();
    if aborted > 0 {
        tracing::debug!(aborted, "aborting workers still running after grace period");
    }
    workers.shutdown().await;

    RunOutcome {
        summary,
        launched: launched.load(Ordering::Acquire),
        drained,
        aborted,
    }
}
