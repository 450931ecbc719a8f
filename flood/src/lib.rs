//! Load generation engine: a pool of request loops hammering one HTTP target for a bounded
//! time, with shared outcome counters, periodic progress and a final summary.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use flood::{ConsoleSink, HttpClient, RunConfig};
//!
//! let config = RunConfig::new("http://127.0.0.1:3000")
//!     .with_workers(10)
//!     .with_duration(Duration::from_secs(5));
//! let handle = flood::start(config, Arc::new(HttpClient::new()), Arc::new(ConsoleSink))?;
//! handle.stop_on_ctrl_c();
//! let outcome = handle.wait().await?;
//! println!("{} requests", outcome.summary.total);
//! # Ok(())
//! # }
//! ```
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod reporter;
pub mod signal;
pub mod statistics;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{HttpClient, Transport};
pub use config::RunConfig;
pub use coordinator::{launch_schedule, start, RunHandle, RunOutcome};
pub use error::{ConfigError, ErrorClass, RequestError, RunError};
pub use reporter::{ConsoleSink, Progress, ReportSink, Reporter, Summary};
pub use signal::{StopCause, StopSignal};
pub use statistics::{FailureReason, StatsAggregator, StatsSnapshot};
