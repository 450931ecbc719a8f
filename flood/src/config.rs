use std::time::Duration;

use http::Uri;

use crate::error::ConfigError;

pub const DEFAULT_TARGET: &str = "http://localhost:3000";
pub const DEFAULT_WORKERS: usize = 100;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
pub const REPORT_INTERVAL: Duration = Duration::from_millis(1000);
pub const LAUNCH_STAGGER: Duration = Duration::from_millis(50);
pub const DEFAULT_ENDPOINTS: [&str; 3] = ["/", "/test", "/api/stats"];

/// Everything a run needs, fixed for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub target: String,
    pub workers: usize,
    pub duration: Duration,
    pub delay: Duration,
    pub request_timeout: Duration,
    pub report_interval: Duration,
    pub launch_stagger: Duration,
    pub endpoints: Vec<String>,
}

impl RunConfig {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            workers: DEFAULT_WORKERS,
            duration: DEFAULT_DURATION,
            delay: DEFAULT_DELAY,
            request_timeout: REQUEST_TIMEOUT,
            report_interval: REPORT_INTERVAL,
            launch_stagger: LAUNCH_STAGGER,
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    #[must_use]
    pub fn with_launch_stagger(mut self, stagger: Duration) -> Self {
        self.launch_stagger = stagger;
        self
    }

    #[must_use]
    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_uris().map(|_| ())
    }

    /// Resolves every endpoint of the pool against the target, in pool order.
    pub fn endpoint_uris(&self) -> Result<Vec<Uri>, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::ZeroReportInterval);
        }
        let base: Uri = self
            .target
            .parse()
            .map_err(|source| ConfigError::InvalidTarget {
                target: self.target.clone(),
                source,
            })?;
        match base.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(ConfigError::UnsupportedScheme(other.to_string())),
            None => return Err(ConfigError::UnsupportedScheme(String::new())),
        }
        if base.host().is_none() {
            return Err(ConfigError::MissingHost(self.target.clone()));
        }
        let base = self.target.trim_end_matches('/');
        self.endpoints
            .iter()
            .map(|path| {
                if !path.starts_with('/') {
                    return Err(ConfigError::InvalidEndpoint(path.clone()));
                }
                let full = format!("{base}{path}");
                full.parse::<Uri>()
                    .map_err(|source| ConfigError::InvalidTarget {
                        target: full.clone(),
                        source,
                    })
            })
            .collect()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}
