pub mod dogstatsd;
pub mod memory;
pub mod timer;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use dogstatsd::DogStatsdClient;
pub use memory::{Emission, InMemoryClient};
pub use timer::{Timer, TimerGuard};

/// The metrics sink the instrumentation writes to.
///
/// Implementations are shared across every request-handling task, so all
/// methods take `&self` and must be callable concurrently. Emission is
/// best-effort: there is no return value to check.
pub trait MetricsClient: Send + Sync {
    fn increment(&self, name: &str, value: i64, tags: &[String]);
    fn decrement(&self, name: &str, value: i64, tags: &[String]);
    fn count(&self, name: &str, value: i64, tags: &[String]);
    fn gauge(&self, name: &str, value: f64, tags: &[String]);
    fn set(&self, name: &str, value: i64, tags: &[String]);
    fn histogram(&self, name: &str, value: f64, tags: &[String], sample_rate: f64);
    /// `value` is milliseconds or fractional seconds, depending on how the
    /// caller was configured.
    fn timing(&self, name: &str, value: f64, tags: &[String], sample_rate: f64);

    /// Push any buffered lines. No-op for unbuffered clients.
    fn flush(&self) {}
}

// ─── Operation names ─────────────────────────────────────────────

/// The closed set of operations a [`MetricsClient`] supports, for callers
/// that pick the operation at runtime (from config, a script, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricOp {
    Increment,
    Decrement,
    Count,
    Gauge,
    Set,
    Histogram,
    Timing,
}

impl MetricOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::Count => "count",
            Self::Gauge => "gauge",
            Self::Set => "set",
            Self::Histogram => "histogram",
            Self::Timing => "timing",
        }
    }
}

impl FromStr for MetricOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increment" | "incr" => Ok(Self::Increment),
            "decrement" | "decr" => Ok(Self::Decrement),
            "count" => Ok(Self::Count),
            "gauge" => Ok(Self::Gauge),
            "set" => Ok(Self::Set),
            "histogram" => Ok(Self::Histogram),
            "timing" => Ok(Self::Timing),
            other => Err(Error::UnsupportedOperation(other.to_owned())),
        }
    }
}

impl fmt::Display for MetricOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
