//! Request lifecycle instrumentation.
//!
//! [`StatsD`] hooks into request handling to emit, per request, one timing
//! metric and (when the response size is known) one size histogram, all
//! tagged with whatever the request accumulated along the way:
//!
//! ```text
//!   before hook          handler                 after hook
//!   ───────────          ───────                 ──────────
//!   start_time = now     add_request_tags(..)    elapsed = now - start_time
//!   endpoint:<path>                              status_code:<code>
//!   method:<verb>                                timing(metric, elapsed, tags)
//!                                                histogram(size_metric, len, tags)
//! ```
//!
//! Metrics are observational: nothing here can change or fail a response.

use std::sync::Arc;

use axum::{
    body::HttpBody,
    extract::{MatchedPath, Request},
    http::header::CONTENT_LENGTH,
    response::Response,
    Router,
};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::metrics::{DogStatsdClient, MetricOp, MetricsClient, Timer};
use crate::middleware::request_state::{self, RequestState};
use crate::middleware::{HookChain, LifecycleHooks};

/// Tag value used when the request did not match a route.
const UNKNOWN_ENDPOINT: &str = "none";

pub struct StatsD {
    config: Config,
    client: Arc<dyn MetricsClient>,
}

impl StatsD {
    /// Instrumentation sending to the DogStatsD agent described by `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = DogStatsdClient::from_config(&config)?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Instrumentation sending to an existing client.
    pub fn with_client(config: Config, client: Arc<dyn MetricsClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn MetricsClient> {
        &self.client
    }

    // ─── Lifecycle ──────────────────────────────────────────────

    /// Register the before/after request callbacks with `hooks`.
    pub fn initialize_lifecycle_hooks(self: &Arc<Self>, hooks: &mut impl LifecycleHooks) {
        let this = Arc::clone(self);
        hooks.before_request(Arc::new(move |req: &Request| this.on_request_start(req)));

        let this = Arc::clone(self);
        hooks.after_request(Arc::new(move |resp: Response| this.on_request_end(resp)));
    }

    /// Instrument every route of `router`.
    pub fn instrument<S>(self: &Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let mut chain = HookChain::new();
        self.initialize_lifecycle_hooks(&mut chain);
        chain.attach(router)
    }

    /// Before-request hook. The endpoint is the matched route template.
    pub fn on_request_start(&self, req: &Request) {
        let endpoint = req.extensions().get::<MatchedPath>().map(MatchedPath::as_str);
        self.start_request(endpoint, req.method().as_str());
    }

    /// Framework-neutral form of [`StatsD::on_request_start`].
    pub fn start_request(&self, endpoint: Option<&str>, method: &str) {
        if !request_state::replace(RequestState::started_now()) {
            debug!("request started outside a request scope; not instrumenting");
            return;
        }

        if self.config.auto_tag {
            let endpoint = endpoint.unwrap_or(UNKNOWN_ENDPOINT).to_lowercase();
            self.add_request_tags([
                format!("{}:{}", self.config.endpoint_tag_name, endpoint),
                format!("{}:{}", self.config.method_tag_name, method.to_lowercase()),
            ]);
        }
    }

    /// After-request hook. Always returns `response` untouched.
    pub fn on_request_end(&self, response: Response) -> Response {
        let size = response_size(&response);
        self.finish_request(response.status().as_u16(), size);
        response
    }

    /// Framework-neutral form of [`StatsD::on_request_end`]. Returns whether
    /// metrics were emitted.
    pub fn finish_request(&self, status: u16, size: Option<u64>) -> bool {
        let Some(RequestState {
            start_time: Some(start_time),
            mut tags,
        }) = request_state::take()
        else {
            debug!(status, "no request state; skipping response metrics");
            return false;
        };

        let elapsed = start_time.elapsed().as_secs_f64();
        let elapsed = if self.config.use_ms {
            (elapsed * 1000.0).round()
        } else {
            elapsed
        };

        if self.config.auto_tag {
            tags.push(format!("status_code:{status}"));
        }

        let sample_rate = self.config.sample_rate;
        self.client
            .timing(&self.config.metric_name, elapsed, &tags, sample_rate);

        if let Some(size) = size {
            self.client
                .histogram(&self.config.size_metric_name, size as f64, &tags, sample_rate);
        }
        true
    }

    // ─── Request tags ───────────────────────────────────────────

    /// Append tags to the current request and return the full list.
    ///
    /// Outside a request the tags are dropped and an empty list returned.
    pub fn add_request_tags<I, T>(&self, tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        request_state::append_tags(&tags).unwrap_or_else(|| {
            debug!(?tags, "no request scope; dropping request tags");
            Vec::new()
        })
    }

    pub fn get_request_tags(&self) -> Vec<String> {
        request_state::tags()
    }

    // ─── Direct emission ────────────────────────────────────────

    pub fn incr(&self, name: &str, value: i64, tags: &[String]) {
        self.client.increment(name, value, tags);
    }

    pub fn decr(&self, name: &str, value: i64, tags: &[String]) {
        self.client.decrement(name, value, tags);
    }

    pub fn count(&self, name: &str, value: i64, tags: &[String]) {
        self.client.count(name, value, tags);
    }

    pub fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        self.client.gauge(name, value, tags);
    }

    pub fn set(&self, name: &str, value: i64, tags: &[String]) {
        self.client.set(name, value, tags);
    }

    pub fn histogram(&self, name: &str, value: f64, tags: &[String], sample_rate: f64) {
        self.client.histogram(name, value, tags, sample_rate);
    }

    pub fn timing(&self, name: &str, value: f64, tags: &[String], sample_rate: f64) {
        self.client.timing(name, value, tags, sample_rate);
    }

    /// Route an operation picked at runtime. Integer operations truncate
    /// `value`; histogram and timing use the configured sample rate.
    pub fn emit(&self, op: MetricOp, name: &str, value: f64, tags: &[String]) {
        let rate = self.config.sample_rate;
        match op {
            MetricOp::Increment => self.incr(name, value as i64, tags),
            MetricOp::Decrement => self.decr(name, value as i64, tags),
            MetricOp::Count => self.count(name, value as i64, tags),
            MetricOp::Gauge => self.gauge(name, value, tags),
            MetricOp::Set => self.set(name, value as i64, tags),
            MetricOp::Histogram => self.histogram(name, value, tags, rate),
            MetricOp::Timing => self.timing(name, value, tags, rate),
        }
    }

    /// An armed (not yet started) timer reporting through this client in
    /// the configured time unit.
    pub fn timer(&self, metric: impl Into<String>, tags: Vec<String>, sample_rate: f64) -> Timer {
        Timer::new(
            Arc::clone(&self.client),
            metric,
            tags,
            sample_rate,
            self.config.use_ms,
        )
    }

    pub fn flush(&self) {
        self.client.flush();
    }
}

/// Response size from `content-length`, falling back to an exact body size.
/// A malformed header is logged and treated as unknown.
fn response_size(response: &Response) -> Option<u64> {
    match response.headers().get(CONTENT_LENGTH) {
        Some(value) => {
            let parsed = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok());
            if parsed.is_none() {
                warn!(?value, "unparseable content-length; skipping size metric");
            }
            parsed
        }
        None => response.body().size_hint().exact(),
    }
}
