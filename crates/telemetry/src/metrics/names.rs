//! Metric names recorded by the streaming dispatcher.

/// Provider calls made, by credential index and outcome.
pub const DISPATCH_ATTEMPTS: &str = "tally.dispatch.attempts";

/// Successful credential rotations.
pub const DISPATCH_ROTATIONS: &str = "tally.dispatch.rotations";

/// Wall time of one dispatched request in milliseconds, by terminal outcome.
pub const DISPATCH_DURATION: &str = "tally.dispatch.duration";

/// Backoff waits started, by failure reason.
pub const DISPATCH_BACKOFF: &str = "tally.dispatch.backoff";
