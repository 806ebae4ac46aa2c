use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced while setting up instrumentation.
///
/// Nothing on the request path returns this type: once a request is
/// being served, emission problems are logged and swallowed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid toml: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("environment variable {key} has invalid value {value:?}")]
    Env { key: &'static str, value: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metric sink error: {0}")]
    Metric(#[from] cadence::MetricError),

    #[error("unsupported metrics operation '{0}'")]
    UnsupportedOperation(String),
}
