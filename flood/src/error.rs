use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Rejections raised while validating a [`crate::config::RunConfig`], before any worker
/// is launched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid target url {target:?}: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("target url {0:?} has no host")]
    MissingHost(String),

    #[error("unsupported scheme {0:?}, only plain http targets are supported")]
    UnsupportedScheme(String),

    #[error("worker count must be positive")]
    NoWorkers,

    #[error("endpoint pool is empty")]
    NoEndpoints,

    #[error("endpoint {0:?} must start with '/'")]
    InvalidEndpoint(String),

    #[error("report interval must be positive")]
    ZeroReportInterval,
}

/// Transport level classification of a failed request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorClass {
    ConnectionRefused,
    DnsFailure,
    ConnectionReset,
    Timeout,
    Other,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::ConnectionRefused => "connection-refused",
            ErrorClass::DnsFailure => "dns-failure",
            ErrorClass::ConnectionReset => "connection-reset",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Other => "transport-error",
        }
    }

    /// Walks the source chain of `err` looking for something recognisable.
    #[must_use]
    pub fn of(err: &(dyn StdError + 'static)) -> Self {
        let mut cur = Some(err);
        while let Some(e) = cur {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => return ErrorClass::ConnectionRefused,
                    std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof => return ErrorClass::ConnectionReset,
                    std::io::ErrorKind::TimedOut => return ErrorClass::Timeout,
                    _ => {}
                }
            }
            if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
                if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                    return ErrorClass::ConnectionReset;
                }
                if hyper_err.is_timeout() {
                    return ErrorClass::Timeout;
                }
            }
            // hyper-util's `HttpConnector` wraps resolver failures in a `ConnectError`
            // whose message is exactly "dns error", with the io error as its source.
            if e.to_string().starts_with("dns error") {
                return ErrorClass::DnsFailure;
            }
            cur = e.source();
        }
        ErrorClass::Other
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that never produced an HTTP status.
#[derive(Debug, Error)]
#[error("{class}")]
pub struct RequestError {
    class: ErrorClass,
    #[source]
    source: Option<BoxError>,
}

impl RequestError {
    #[must_use]
    pub fn new(class: ErrorClass) -> Self {
        Self {
            class,
            source: None,
        }
    }

    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ErrorClass::Timeout)
    }

    /// Classifies `source` and keeps it for logging.
    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let class = ErrorClass::of(&source);
        Self {
            class,
            source: Some(Box::new(source)),
        }
    }

    #[inline]
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.class
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run coordinator task failed")]
    Join(#[from] tokio::task::JoinError),
}
