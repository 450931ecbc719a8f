//! A single request loop: pick an endpoint, issue, record, pause, repeat.
use std::sync::Arc;
use std::time::Duration;

use http::Uri;

use crate::client::Transport;
use crate::config::RunConfig;
use crate::error::ErrorClass;
use crate::signal::StopSignal;
use crate::statistics::{FailureReason, StatsAggregator};

/// What one worker did during its life, for logging.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct WorkerTally {
    /// Requests started.
    pub issued: u64,
    /// Outcomes that made it into the aggregator.
    pub recorded: u64,
    /// Requests dropped in flight because the run stopped.
    pub abandoned: u64,
}

pub(crate) struct Worker<T> {
    id: usize,
    transport: Arc<T>,
    endpoints: Arc<[Uri]>,
    delay: Duration,
    request_timeout: Duration,
    stats: Arc<StatsAggregator>,
    stop: StopSignal,
}

impl<T> Worker<T>
where
    T: Transport,
{
    /// `endpoints` comes from [`RunConfig::endpoint_uris`], which never returns an empty
    /// pool.
    #[must_use]
    pub(crate) fn new(
        id: usize,
        config: &RunConfig,
        endpoints: Arc<[Uri]>,
        transport: Arc<T>,
        stats: Arc<StatsAggregator>,
        stop: StopSignal,
    ) -> Self {
        Self {
            id,
            transport,
            endpoints,
            delay: config.delay,
            request_timeout: config.request_timeout,
            stats,
            stop,
        }
    }

    /// Runs until the stop signal is set. Request failures never end the loop.
    pub(crate) async fn run(self) -> WorkerTally {
        let mut tally = WorkerTally::default();
        tracing::debug!(worker_id = self.id, "worker started");

        while !self.stop.is_stopped() {
            let uri = self.pick_endpoint();
            tally.issued += 1;
            let outcome = tokio::select! {
                biased;
                () = self.stop.stopped() => {
                    tally.abandoned += 1;
                    break;
                }
                outcome = self.issue(uri) => outcome,
            };
            if self.stats.record(outcome) {
                tally.recorded += 1;
            }
            if self.stop.is_stopped() {
                break;
            }
            if self.delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                biased;
                () = self.stop.stopped() => break,
                () = tokio::time::sleep(self.delay) => {}
            }
        }

        tracing::debug!(
            worker_id = self.id,
            issued = tally.issued,
            recorded = tally.recorded,
            abandoned = tally.abandoned,
            "worker finished"
        );
        tally
    }

    fn pick_endpoint(&self) -> Uri {
        let idx = rand::random_range(0..self.endpoints.len());
        self.endpoints[idx].clone()
    }

    /// Issues one request under the per-request timeout. Timing out drops the transport
    /// future, which tears down its connection.
    async fn issue(&self, uri: Uri) -> Result<(), FailureReason> {
        match tokio::time::timeout(self.request_timeout, self.transport.get(uri)).await {
            Ok(Ok(status)) => FailureReason::from_status(status),
            Ok(Err(e)) => {
                tracing::trace!(worker_id = self.id, error = ?e, "request failed");
                Err(e.class().into())
            }
            Err(_elapsed) => {
                tracing::trace!(worker_id = self.id, "request timed out");
                Err(ErrorClass::Timeout.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::StopCause;
    use crate::testing::{Behaviour, FakeTransport};
    use http::StatusCode;

    fn endpoints(cfg: &RunConfig) -> Arc<[Uri]> {
        cfg.endpoint_uris().unwrap().into()
    }

    fn spawn_worker(
        cfg: &RunConfig,
        transport: &Arc<FakeTransport>,
    ) -> (
        Arc<StatsAggregator>,
        StopSignal,
        tokio::task::JoinHandle<WorkerTally>,
    ) {
        let stats = Arc::new(StatsAggregator::new());
        let stop = StopSignal::new();
        let worker = Worker::new(
            0,
            cfg,
            endpoints(cfg),
            transport.clone(),
            stats.clone(),
            stop.clone(),
        );
        (stats, stop, tokio::spawn(worker.run()))
    }

    #[tokio::test(start_paused = true)]
    async fn paces_requests_by_latency_and_delay() {
        let cfg = RunConfig::new("http://127.0.0.1:9").with_delay(Duration::from_millis(100));
        let transport = Arc::new(FakeTransport::ok(Duration::ZERO));
        let (stats, stop, handle) = spawn_worker(&cfg, &transport);

        tokio::time::sleep(Duration::from_millis(1050)).await;
        stop.stop(StopCause::DurationElapsed);
        let tally = handle.await.unwrap();

        // t = 0, 100, ..., 1000
        assert!((10..=11).contains(&tally.issued), "{tally:?}");
        assert_eq!(tally.recorded, tally.issued);
        let snap = stats.snapshot();
        assert_eq!(snap.total, tally.issued);
        assert_eq!(snap.success, snap.total);
        assert_eq!(snap.failure, 0);

        let issued = transport.issued();
        for pair in issued.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn picks_only_configured_endpoints() {
        let cfg = RunConfig::new("http://127.0.0.1:9")
            .with_delay(Duration::from_millis(1))
            .with_endpoints(["/a", "/b"]);
        let transport = Arc::new(FakeTransport::ok(Duration::ZERO));
        let (_stats, stop, handle) = spawn_worker(&cfg, &transport);

        tokio::time::sleep(Duration::from_millis(500)).await;
        stop.stop(StopCause::DurationElapsed);
        handle.await.unwrap();

        let paths: Vec<String> = transport
            .issued()
            .iter()
            .map(|(_, uri)| uri.path().to_string())
            .collect();
        assert!(paths.iter().all(|p| p == "/a" || p == "/b"));
        assert!(paths.iter().any(|p| p == "/a"));
        assert!(paths.iter().any(|p| p == "/b"));
    }

    #[tokio::test(start_paused = true)]
    async fn records_status_failures_by_code() {
        let cfg = RunConfig::new("http://127.0.0.1:9").with_delay(Duration::from_millis(10));
        let transport = Arc::new(FakeTransport::new(Behaviour::Respond {
            status: StatusCode::SERVICE_UNAVAILABLE,
            latency: Duration::from_millis(5),
        }));
        let (stats, stop, handle) = spawn_worker(&cfg, &transport);

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.stop(StopCause::DurationElapsed);
        handle.await.unwrap();

        let snap = stats.snapshot();
        assert!(snap.total > 0);
        assert_eq!(snap.success, 0);
        assert_eq!(snap.failure, snap.total);
        assert_eq!(snap.reasons.len(), 1);
        assert_eq!(snap.reasons[&FailureReason::Status(503)], snap.total);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_keep_the_loop_going() {
        let cfg = RunConfig::new("http://127.0.0.1:9").with_delay(Duration::from_millis(10));
        let transport = Arc::new(FakeTransport::new(Behaviour::Fail(
            ErrorClass::ConnectionRefused,
        )));
        let (stats, stop, handle) = spawn_worker(&cfg, &transport);

        tokio::time::sleep(Duration::from_millis(95)).await;
        stop.stop(StopCause::Interrupted);
        let tally = handle.await.unwrap();

        assert!((9..=10).contains(&tally.issued), "{tally:?}");
        let snap = stats.snapshot();
        assert_eq!(snap.total, tally.issued);
        assert_eq!(
            snap.reasons[&FailureReason::Transport(ErrorClass::ConnectionRefused)],
            snap.total
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_recorded_and_aborted() {
        let cfg = RunConfig::new("http://127.0.0.1:9").with_delay(Duration::ZERO);
        let transport = Arc::new(FakeTransport::new(Behaviour::Hang));
        let (stats, stop, handle) = spawn_worker(&cfg, &transport);

        tokio::time::sleep(Duration::from_millis(5000 * 3 + 1)).await;
        // Three requests timed out, the fourth is in flight.
        assert_eq!(stats.snapshot().total, 3);
        assert_eq!(transport.in_flight(), 1);

        stop.stop(StopCause::DurationElapsed);
        let tally = handle.await.unwrap();

        assert_eq!(tally.issued, 4);
        assert_eq!(tally.abandoned, 1);
        assert_eq!(transport.in_flight(), 0);
        let snap = stats.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(
            snap.reasons[&FailureReason::Transport(ErrorClass::Timeout)],
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_request_discards_the_result() {
        let cfg = RunConfig::new("http://127.0.0.1:9");
        let transport = Arc::new(FakeTransport::ok(Duration::from_secs(1)));
        let (stats, stop, handle) = spawn_worker(&cfg, &transport);

        tokio::time::sleep(Duration::from_millis(500)).await;
        stop.stop(StopCause::Interrupted);
        let tally = handle.await.unwrap();

        assert_eq!(tally.issued, 1);
        assert_eq!(tally.abandoned, 1);
        assert_eq!(stats.snapshot().total, 0);
        assert_eq!(transport.in_flight(), 0);
    }

    #[tokio::test]
    async fn stopped_worker_issues_nothing() {
        let cfg = RunConfig::new("http://127.0.0.1:9");
        let transport = Arc::new(FakeTransport::ok(Duration::ZERO));
        let stats = Arc::new(StatsAggregator::new());
        let stop = StopSignal::new();
        stop.stop(StopCause::DurationElapsed);

        let tally = Worker::new(7, &cfg, endpoints(&cfg), transport.clone(), stats, stop)
            .run()
            .await;
        assert_eq!(tally, WorkerTally::default());
        assert_eq!(transport.calls(), 0);
    }
}
