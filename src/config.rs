//! Resolved instrumentation settings.
//!
//! Keys use the upper-case names operators already set in their
//! environment (`STATSD_HOST`, `DATADOG_RESPONSE_METRIC_NAME`, ...). Any key
//! left out falls back to the default listed on [`Config::default`]. The
//! merge happens once, when the config is built; nothing re-reads it per
//! request.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

// ─── Defaults ────────────────────────────────────────────────────

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8125;
/// Bytes buffered before a datagram is written.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 512;
pub const DEFAULT_ENDPOINT_TAG_NAME: &str = "endpoint";
pub const DEFAULT_METHOD_TAG_NAME: &str = "method";
pub const DEFAULT_METRIC_NAME: &str = "axum.response.time";
pub const DEFAULT_SIZE_METRIC_NAME: &str = "axum.response.size";
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;

// ─── Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "STATSD_HOST")]
    pub host: String,
    #[serde(rename = "STATSD_PORT")]
    pub port: u16,
    /// Unix datagram socket; takes precedence over host/port when set.
    #[serde(rename = "STATSD_SOCKET_PATH")]
    pub socket_path: Option<String>,
    #[serde(rename = "STATSD_MAX_BUFFER_SIZE")]
    pub max_buffer_size: usize,
    #[serde(rename = "STATSD_NAMESPACE")]
    pub namespace: Option<String>,
    /// Constant tags attached to every metric.
    #[serde(rename = "STATSD_TAGS")]
    pub tags: Vec<String>,
    #[serde(rename = "STATSD_USEMS")]
    pub use_ms: bool,

    #[serde(rename = "DATADOG_RESPONSE_AUTO_TAG")]
    pub auto_tag: bool,
    #[serde(rename = "DATADOG_RESPONSE_ENDPOINT_TAG_NAME")]
    pub endpoint_tag_name: String,
    #[serde(rename = "DATADOG_RESPONSE_METHOD_TAG_NAME")]
    pub method_tag_name: String,
    #[serde(rename = "DATADOG_RESPONSE_METRIC_NAME")]
    pub metric_name: String,
    #[serde(rename = "DATADOG_RESPONSE_SIZE_METRIC_NAME")]
    pub size_metric_name: String,
    #[serde(rename = "DATADOG_RESPONSE_SAMPLE_RATE")]
    pub sample_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            socket_path: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            namespace: None,
            tags: Vec::new(),
            use_ms: false,
            auto_tag: true,
            endpoint_tag_name: DEFAULT_ENDPOINT_TAG_NAME.into(),
            method_tag_name: DEFAULT_METHOD_TAG_NAME.into(),
            metric_name: DEFAULT_METRIC_NAME.into(),
            size_metric_name: DEFAULT_SIZE_METRIC_NAME.into(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Overlay process environment variables on the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(v) = lookup("STATSD_HOST") {
            cfg.host = v;
        }
        if let Some(v) = parsed(&lookup, "STATSD_PORT")? {
            cfg.port = v;
        }
        if let Some(v) = lookup("STATSD_SOCKET_PATH").filter(|v| !v.is_empty()) {
            cfg.socket_path = Some(v);
        }
        if let Some(v) = parsed(&lookup, "STATSD_MAX_BUFFER_SIZE")? {
            cfg.max_buffer_size = v;
        }
        if let Some(v) = lookup("STATSD_NAMESPACE").filter(|v| !v.is_empty()) {
            cfg.namespace = Some(v);
        }
        if let Some(v) = lookup("STATSD_TAGS") {
            cfg.tags = v
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = flag(&lookup, "STATSD_USEMS")? {
            cfg.use_ms = v;
        }
        if let Some(v) = flag(&lookup, "DATADOG_RESPONSE_AUTO_TAG")? {
            cfg.auto_tag = v;
        }
        if let Some(v) = lookup("DATADOG_RESPONSE_ENDPOINT_TAG_NAME") {
            cfg.endpoint_tag_name = v;
        }
        if let Some(v) = lookup("DATADOG_RESPONSE_METHOD_TAG_NAME") {
            cfg.method_tag_name = v;
        }
        if let Some(v) = lookup("DATADOG_RESPONSE_METRIC_NAME") {
            cfg.metric_name = v;
        }
        if let Some(v) = lookup("DATADOG_RESPONSE_SIZE_METRIC_NAME") {
            cfg.size_metric_name = v;
        }
        if let Some(v) = parsed(&lookup, "DATADOG_RESPONSE_SAMPLE_RATE")? {
            cfg.sample_rate = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "sample rate must be in (0.0, 1.0], got {}",
                self.sample_rate
            )));
        }
        if self.socket_path.is_none() && self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".into()));
        }
        let names = [
            ("endpoint tag name", &self.endpoint_tag_name),
            ("method tag name", &self.method_tag_name),
            ("metric name", &self.metric_name),
            ("size metric name", &self.size_metric_name),
        ];
        for (what, value) in names {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{what} must not be empty")));
            }
        }
        Ok(())
    }
}

// ─── Env helpers ─────────────────────────────────────────────────

fn parsed<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Env { key, value: raw }),
    }
}

fn flag<F>(lookup: &F, key: &'static str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(Error::Env { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 8125);
        assert_eq!(cfg.max_buffer_size, 512);
        assert!(cfg.namespace.is_none());
        assert!(cfg.tags.is_empty());
        assert!(!cfg.use_ms);
        assert!(cfg.auto_tag);
        assert_eq!(cfg.sample_rate, 1.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_merges_over_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            STATSD_HOST = "127.0.0.1"
            STATSD_PORT = 8124
            STATSD_NAMESPACE = "test"
            STATSD_USEMS = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8124);
        assert_eq!(cfg.namespace.as_deref(), Some("test"));
        assert!(cfg.use_ms);

        let defaults = Config::default();
        assert_eq!(cfg.max_buffer_size, defaults.max_buffer_size);
        assert_eq!(cfg.tags, defaults.tags);
        assert_eq!(cfg.auto_tag, defaults.auto_tag);
        assert_eq!(cfg.metric_name, defaults.metric_name);
        assert_eq!(cfg.size_metric_name, defaults.size_metric_name);
        assert_eq!(cfg.sample_rate, defaults.sample_rate);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = Config::from_toml_str("SECRET_KEY = \"abc\"\n").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn env_overlay() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("STATSD_PORT", "9125"),
            ("STATSD_TAGS", "env:prod, region:eu ,"),
            ("STATSD_USEMS", "yes"),
            ("DATADOG_RESPONSE_AUTO_TAG", "0"),
            ("DATADOG_RESPONSE_SAMPLE_RATE", "0.25"),
        ]))
        .unwrap();

        assert_eq!(cfg.port, 9125);
        assert_eq!(cfg.tags, vec!["env:prod", "region:eu"]);
        assert!(cfg.use_ms);
        assert!(!cfg.auto_tag);
        assert_eq!(cfg.sample_rate, 0.25);
        assert_eq!(cfg.host, "localhost");
    }

    #[test]
    fn env_rejects_garbage() {
        let err = Config::from_lookup(lookup_from(&[("STATSD_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, Error::Env { key: "STATSD_PORT", .. }));

        let err = Config::from_lookup(lookup_from(&[("STATSD_USEMS", "maybe")])).unwrap_err();
        assert!(matches!(err, Error::Env { key: "STATSD_USEMS", .. }));
    }

    #[test]
    fn sample_rate_bounds() {
        for bad in [0.0, -0.5, 1.5, f64::NAN] {
            let cfg = Config {
                sample_rate: bad,
                ..Config::default()
            };
            assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))), "{bad}");
        }
        let cfg = Config {
            sample_rate: 0.01,
            ..Config::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_metric_name_rejected() {
        let err = Config::from_toml_str("DATADOG_RESPONSE_METRIC_NAME = \"  \"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
