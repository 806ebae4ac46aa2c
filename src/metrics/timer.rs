use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::MetricsClient;

/// Reports how long a piece of work took as one timing metric.
///
/// A timer is *armed* until [`Timer::start`] and *running* until
/// [`Timer::stop`], which reports and re-arms it, so the same timer can
/// be reused. Calling `start` on a running timer moves the start point
/// forward. Calling `stop` on an armed timer does nothing, which also
/// means a second `stop` never reports twice.
///
/// For scoped use prefer [`Timer::guard`], [`Timer::time`] or
/// [`Timer::time_async`]: they report even when the timed code panics.
pub struct Timer {
    client: Arc<dyn MetricsClient>,
    metric: String,
    tags: Vec<String>,
    sample_rate: f64,
    use_ms: bool,
    started: Option<Instant>,
}

impl Timer {
    pub fn new(
        client: Arc<dyn MetricsClient>,
        metric: impl Into<String>,
        tags: Vec<String>,
        sample_rate: f64,
        use_ms: bool,
    ) -> Self {
        Self {
            client,
            metric: metric.into(),
            tags,
            sample_rate,
            use_ms,
            started: None,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Report the elapsed time and re-arm. Returns the reported value, or
    /// `None` when the timer was not running.
    pub fn stop(&mut self) -> Option<f64> {
        let started = self.started.take()?;
        let elapsed = started.elapsed();
        let value = if self.use_ms {
            (elapsed.as_secs_f64() * 1000.0).round()
        } else {
            elapsed.as_secs_f64()
        };
        self.client
            .timing(&self.metric, value, &self.tags, self.sample_rate);
        Some(value)
    }

    /// Start now; stop when the returned guard is dropped.
    pub fn guard(&mut self) -> TimerGuard<'_> {
        self.start();
        TimerGuard { timer: self }
    }

    pub fn time<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let _guard = self.guard();
        f()
    }

    pub async fn time_async<F: Future>(&mut self, fut: F) -> F::Output {
        let _guard = self.guard();
        fut.await
    }

    /// Turn `f` into a callable that times every invocation.
    pub fn wrap<R>(mut self, mut f: impl FnMut() -> R) -> impl FnMut() -> R {
        move || self.time(&mut f)
    }
}

/// Running scope of a [`Timer`]. Dropping it (including during unwinding)
/// stops the timer.
pub struct TimerGuard<'a> {
    timer: &'a mut Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop();
    }
}
