//! Scripted transports for engine tests.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{StatusCode, Uri};
use tokio::time::Instant;

use crate::client::Transport;
use crate::error::{ErrorClass, RequestError};
use crate::reporter::{Progress, ReportSink, Summary};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Behaviour {
    Respond { status: StatusCode, latency: Duration },
    Fail(ErrorClass),
    Hang,
}

/// Counts requests that are currently in flight, decremented when the request future
/// completes or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeTransport {
    behaviour: Behaviour,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    issued: Mutex<Vec<(Instant, Uri)>>,
}

impl FakeTransport {
    pub(crate) fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ok(latency: Duration) -> Self {
        Self::new(Behaviour::Respond {
            status: StatusCode::OK,
            latency,
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn issued(&self) -> Vec<(Instant, Uri)> {
        self.issued.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    async fn get(&self, uri: Uri) -> Result<StatusCode, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.issued.lock().unwrap().push((Instant::now(), uri));
        let _guard = InFlight::enter(&self.in_flight);
        match self.behaviour {
            Behaviour::Respond { status, latency } => {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                Ok(status)
            }
            Behaviour::Fail(class) => Err(RequestError::new(class)),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

/// Keeps everything a reporter emits.
#[derive(Default)]
pub(crate) struct RecordingSink {
    progress: Mutex<Vec<Progress>>,
    summaries: Mutex<Vec<Summary>>,
}

impl RecordingSink {
    pub(crate) fn progress_lines(&self) -> Vec<Progress> {
        self.progress.lock().unwrap().clone()
    }

    pub(crate) fn summaries(&self) -> Vec<Summary> {
        self.summaries.lock().unwrap().clone()
    }
}

impl ReportSink for RecordingSink {
    fn progress(&self, progress: &Progress) {
        self.progress.lock().unwrap().push(progress.clone());
    }

    fn summary(&self, summary: &Summary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}
