use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// What ended a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopCause {
    DurationElapsed,
    Interrupted,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::DurationElapsed => f.write_str("duration elapsed"),
            StopCause::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Run-wide stop flag. Set once, never cleared, cheap to clone.
///
/// The first caller of [`StopSignal::stop`] decides the [`StopCause`], later calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    cause: Arc<OnceLock<StopCause>>,
    token: CancellationToken,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this call flipped the signal.
    pub fn stop(&self, cause: StopCause) -> bool {
        if self.cause.set(cause).is_err() {
            return false;
        }
        tracing::debug!(%cause, "stop signal set");
        self.token.cancel();
        true
    }

    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cause.get().is_some()
    }

    #[inline]
    #[must_use]
    pub fn cause(&self) -> Option<StopCause> {
        self.cause.get().copied()
    }

    /// Resolves once the signal is set.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}
