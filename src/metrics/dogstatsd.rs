use std::net::UdpSocket;

use cadence::prelude::*;
use cadence::{BufferedUdpMetricSink, QueuingMetricSink, StatsdClient, UdpMetricSink};
use tracing::{debug, warn};

use super::MetricsClient;
use crate::config::Config;
use crate::error::Result;

/// Connection-level settings handed to the StatsD client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub socket_path: Option<String>,
    pub max_buffer_size: usize,
    pub namespace: Option<String>,
    pub constant_tags: Vec<String>,
    pub use_ms: bool,
}

impl ClientSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            socket_path: cfg.socket_path.clone(),
            max_buffer_size: cfg.max_buffer_size,
            namespace: cfg.namespace.clone(),
            constant_tags: cfg.tags.clone(),
            use_ms: cfg.use_ms,
        }
    }
}

/// DogStatsD client backed by `cadence`.
///
/// Lines are buffered up to `max_buffer_size` bytes and handed to a
/// background thread by [`QueuingMetricSink`], so emitting never blocks a
/// request on socket I/O. Send failures go to the log, not the caller.
pub struct DogStatsdClient {
    client: StatsdClient,
    settings: ClientSettings,
}

// Attaches `"name:value"` tags (or bare values) and sends. With a rate
// below 1.0 the line carries `|@rate`; the caller has already sampled.
macro_rules! send_tagged {
    ($builder:expr, $tags:expr, $rate:expr) => {{
        let rate: f64 = $rate;
        let builder = $builder;
        let builder = if rate < 1.0 {
            builder.with_sampling_rate(rate)
        } else {
            builder
        };
        send_tagged!(builder, $tags)
    }};
    ($builder:expr, $tags:expr) => {{
        let mut builder = $builder;
        for tag in $tags {
            builder = match tag.split_once(':') {
                Some((key, value)) => builder.with_tag(key, value),
                None => builder.with_tag_value(tag.as_str()),
            };
        }
        builder.send();
    }};
}

impl DogStatsdClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(ClientSettings::from_config(cfg))
    }

    pub fn new(settings: ClientSettings) -> Result<Self> {
        let sink = build_sink(&settings)?;
        let prefix = settings.namespace.as_deref().unwrap_or("");

        let mut builder = StatsdClient::builder(prefix, sink)
            .with_error_handler(|err| warn!(error = %err, "dropping metric"));
        for tag in &settings.constant_tags {
            builder = match tag.split_once(':') {
                Some((key, value)) => builder.with_tag(key, value),
                None => builder.with_tag_value(tag),
            };
        }

        debug!(
            host = %settings.host,
            port = settings.port,
            socket_path = ?settings.socket_path,
            namespace = ?settings.namespace,
            "dogstatsd client ready"
        );

        Ok(Self {
            client: builder.build(),
            settings,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }
}

fn build_sink(settings: &ClientSettings) -> Result<QueuingMetricSink> {
    if let Some(path) = &settings.socket_path {
        return unix_sink(path);
    }

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    let addr = (settings.host.as_str(), settings.port);

    let sink = if settings.max_buffer_size == 0 {
        QueuingMetricSink::from(UdpMetricSink::from(addr, socket)?)
    } else {
        QueuingMetricSink::from(BufferedUdpMetricSink::with_capacity(
            addr,
            socket,
            settings.max_buffer_size,
        )?)
    };
    Ok(sink)
}

#[cfg(unix)]
fn unix_sink(path: &str) -> Result<QueuingMetricSink> {
    use std::os::unix::net::UnixDatagram;

    let socket = UnixDatagram::unbound()?;
    socket.set_nonblocking(true)?;
    Ok(QueuingMetricSink::from(cadence::UnixMetricSink::from(
        path, socket,
    )))
}

#[cfg(not(unix))]
fn unix_sink(path: &str) -> Result<QueuingMetricSink> {
    Err(crate::error::Error::InvalidConfig(format!(
        "socket path {path} requires a unix platform"
    )))
}

/// Keep an observation with probability `rate`.
fn sampled(rate: f64) -> bool {
    rate >= 1.0 || rand::random::<f64>() < rate
}

impl MetricsClient for DogStatsdClient {
    fn increment(&self, name: &str, value: i64, tags: &[String]) {
        send_tagged!(self.client.count_with_tags(name, value), tags);
    }

    fn decrement(&self, name: &str, value: i64, tags: &[String]) {
        send_tagged!(self.client.count_with_tags(name, -value), tags);
    }

    fn count(&self, name: &str, value: i64, tags: &[String]) {
        send_tagged!(self.client.count_with_tags(name, value), tags);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        send_tagged!(self.client.gauge_with_tags(name, value), tags);
    }

    fn set(&self, name: &str, value: i64, tags: &[String]) {
        send_tagged!(self.client.set_with_tags(name, value), tags);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String], sample_rate: f64) {
        if !sampled(sample_rate) {
            return;
        }
        send_tagged!(self.client.histogram_with_tags(name, value), tags, sample_rate);
    }

    fn timing(&self, name: &str, value: f64, tags: &[String], sample_rate: f64) {
        if !sampled(sample_rate) {
            return;
        }
        if !value.is_finite() || value < 0.0 {
            warn!(metric = name, value, "timing value out of range");
            return;
        }
        if self.settings.use_ms {
            // Whole milliseconds as a `|ms` timer.
            let millis = value.round() as u64;
            send_tagged!(self.client.time_with_tags(name, millis), tags, sample_rate);
        } else {
            // cadence timers are integral; fractional seconds go out as a
            // histogram, which the agent aggregates the same way.
            send_tagged!(self.client.histogram_with_tags(name, value), tags, sample_rate);
        }
    }

    fn flush(&self) {
        if let Err(err) = self.client.flush() {
            warn!(error = %err, "metric flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn custom_config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 8124,
            max_buffer_size: 100,
            namespace: Some("test_axum".into()),
            tags: vec!["key:value".into()],
            use_ms: true,
            ..Config::default()
        }
    }

    #[test]
    fn default_settings() {
        let client = DogStatsdClient::from_config(&Config::default()).unwrap();
        let s = client.settings();
        assert_eq!(s.host, crate::config::DEFAULT_HOST);
        assert_eq!(s.port, crate::config::DEFAULT_PORT);
        assert_eq!(s.max_buffer_size, crate::config::DEFAULT_MAX_BUFFER_SIZE);
        assert!(s.namespace.is_none());
        assert!(s.constant_tags.is_empty());
        assert!(!s.use_ms);
    }

    #[test]
    fn custom_settings() {
        let cfg = custom_config();
        let client = DogStatsdClient::from_config(&cfg).unwrap();
        let s = client.settings();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 8124);
        assert_eq!(s.namespace.as_deref(), Some("test_axum"));
        assert_eq!(s.max_buffer_size, 100);
        assert_eq!(s.constant_tags[0], "key:value");
        assert!(s.use_ms);
    }

    #[test]
    fn writes_dogstatsd_lines() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = server.local_addr().unwrap().port();

        let cfg = Config {
            host: "127.0.0.1".into(),
            port,
            max_buffer_size: 0,
            namespace: Some("svc".into()),
            tags: vec!["env:test".into()],
            ..Config::default()
        };
        let client = DogStatsdClient::from_config(&cfg).unwrap();
        client.increment("hits", 1, &["route:index".into()]);

        let mut buf = [0u8; 512];
        let n = server.recv(&mut buf).unwrap();
        let line = std::str::from_utf8(&buf[..n]).unwrap();

        assert!(line.starts_with("svc.hits:1|c"), "{line}");
        assert!(line.contains("route:index"), "{line}");
        assert!(line.contains("env:test"), "{line}");
    }

    fn udp_client(use_ms: bool) -> (UdpSocket, DogStatsdClient) {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let cfg = Config {
            host: "127.0.0.1".into(),
            port: server.local_addr().unwrap().port(),
            max_buffer_size: 0,
            use_ms,
            ..Config::default()
        };
        let client = DogStatsdClient::from_config(&cfg).unwrap();
        (server, client)
    }

    fn recv_line(server: &UdpSocket) -> String {
        let mut buf = [0u8; 512];
        let n = server.recv(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn sampled_lines_carry_the_rate() {
        let (server, client) = udp_client(false);

        // Enough sends that the sampler keeps at least one.
        for _ in 0..64 {
            client.histogram("req.size", 42.0, &[], 0.5);
        }
        assert_eq!(recv_line(&server), "req.size:42|h|@0.5");
    }

    #[test]
    fn unsampled_lines_have_no_rate() {
        let (server, client) = udp_client(false);
        client.histogram("req.size", 42.0, &[], 1.0);
        assert_eq!(recv_line(&server), "req.size:42|h");
    }

    #[test]
    fn seconds_timing_keeps_fractions() {
        let (server, client) = udp_client(false);
        client.timing("req.time", 0.0007, &[], 1.0);
        assert_eq!(recv_line(&server), "req.time:0.0007|h");
    }

    #[test]
    fn millisecond_timing_is_a_timer() {
        let (server, client) = udp_client(true);
        client.timing("req.time", 12.4, &["route:x".into()], 1.0);
        assert_eq!(recv_line(&server), "req.time:12|ms|#route:x");
    }

    #[test]
    fn sampling_edges() {
        assert!(sampled(1.0));
        assert!((0..1000).all(|_| !sampled(0.0)));
    }
}
