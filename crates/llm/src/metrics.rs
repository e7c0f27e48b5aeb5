//! Counters recorded by the streaming dispatcher.

use telemetry::{
    Counter, KeyValue,
    metrics::{DISPATCH_ATTEMPTS, DISPATCH_BACKOFF, DISPATCH_ROTATIONS},
};

/// Instruments shared by every dispatched request.
#[derive(Clone)]
pub(crate) struct DispatchMetrics {
    attempts: Counter<u64>,
    rotations: Counter<u64>,
    backoff: Counter<u64>,
}

impl DispatchMetrics {
    pub(crate) fn new() -> Self {
        let meter = telemetry::metrics::meter();

        Self {
            attempts: meter.u64_counter(DISPATCH_ATTEMPTS).build(),
            rotations: meter.u64_counter(DISPATCH_ROTATIONS).build(),
            backoff: meter.u64_counter(DISPATCH_BACKOFF).build(),
        }
    }

    pub(crate) fn attempt(&self, credential_index: usize, outcome: &'static str) {
        let attributes = [
            KeyValue::new("credential.index", credential_index as i64),
            KeyValue::new("outcome", outcome),
        ];

        self.attempts.add(1, &attributes);
    }

    pub(crate) fn rotation(&self) {
        self.rotations.add(1, &[]);
    }

    pub(crate) fn backoff(&self, reason: &'static str) {
        self.backoff.add(1, &[KeyValue::new("reason", reason)]);
    }
}
