use parking_lot::Mutex;

use super::{MetricOp, MetricsClient};

/// One call made against an [`InMemoryClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub op: MetricOp,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    /// Only histogram and timing calls carry a rate.
    pub sample_rate: Option<f64>,
}

/// Records every call instead of sending it anywhere.
///
/// Sample rates are recorded, not applied, so assertions see every
/// observation.
#[derive(Debug, Default)]
pub struct InMemoryClient {
    emissions: Mutex<Vec<Emission>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in call order.
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.lock().clone()
    }

    pub fn emissions_for(&self, op: MetricOp) -> Vec<Emission> {
        self.emissions
            .lock()
            .iter()
            .filter(|e| e.op == op)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.emissions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.lock().is_empty()
    }

    fn push(&self, op: MetricOp, name: &str, value: f64, tags: &[String], sample_rate: Option<f64>) {
        self.emissions.lock().push(Emission {
            op,
            name: name.to_owned(),
            value,
            tags: tags.to_vec(),
            sample_rate,
        });
    }
}

impl MetricsClient for InMemoryClient {
    fn increment(&self, name: &str, value: i64, tags: &[String]) {
        self.push(MetricOp::Increment, name, value as f64, tags, None);
    }

    fn decrement(&self, name: &str, value: i64, tags: &[String]) {
        self.push(MetricOp::Decrement, name, value as f64, tags, None);
    }

    fn count(&self, name: &str, value: i64, tags: &[String]) {
        self.push(MetricOp::Count, name, value as f64, tags, None);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        self.push(MetricOp::Gauge, name, value, tags, None);
    }

    fn set(&self, name: &str, value: i64, tags: &[String]) {
        self.push(MetricOp::Set, name, value as f64, tags, None);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String], sample_rate: f64) {
        self.push(MetricOp::Histogram, name, value, tags, Some(sample_rate));
    }

    fn timing(&self, name: &str, value: f64, tags: &[String], sample_rate: f64) {
        self.push(MetricOp::Timing, name, value, tags, Some(sample_rate));
    }
}
