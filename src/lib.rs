//! Per-request DogStatsD metrics for axum services.
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use axum_datadog::{Config, StatsD};
//!
//! # fn build() -> axum_datadog::Result<Router> {
//! let statsd = Arc::new(StatsD::new(Config::from_env()?)?);
//! let app = Router::new().route("/", get(|| async { "ok" }));
//! Ok(statsd.instrument(app))
//! # }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod statsd;

pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{MetricOp, MetricsClient, Timer};
pub use statsd::StatsD;
