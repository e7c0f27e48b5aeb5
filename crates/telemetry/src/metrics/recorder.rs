use std::time::Instant;

use opentelemetry::{Key, KeyValue, Value, metrics::Histogram};

/// Measures the time from creation until [`Recorder::record`] and records it,
/// in milliseconds, to a histogram.
///
/// ```rust,ignore
/// let mut recorder = Recorder::new(DISPATCH_DURATION);
/// let outcome = dispatcher.run().await;
/// recorder.push_attribute("outcome", outcome.label());
/// recorder.record();
/// ```
pub struct Recorder {
    start: Instant,
    histogram: Histogram<f64>,
    attributes: Vec<KeyValue>,
}

impl Recorder {
    /// Start timing for the given histogram.
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            histogram: super::meter().f64_histogram(name).with_unit("ms").build(),
            attributes: Vec::new(),
        }
    }

    /// Attach an attribute to the recorded value.
    pub fn push_attribute<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        self.attributes.push(KeyValue::new(key, value));
    }

    /// Record the elapsed time.
    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64() * 1000.0;
        self.histogram.record(duration, &self.attributes);
    }
}
