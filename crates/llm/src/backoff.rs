//! Retry delays and the countdown shown while waiting.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{cancel::CancellationController, events::StreamEvent};

/// How a backoff wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Elapsed,
    Aborted,
}

/// Computes retry delays from the configured base delays and provider hints.
#[derive(Debug, Clone)]
pub(crate) struct BackoffScheduler {
    delays: Vec<Duration>,
}

impl BackoffScheduler {
    pub(crate) fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Whole seconds to wait before retry number `attempt` (zero based).
    ///
    /// A provider hint replaces the base delay for this wait. Attempts past
    /// the end of the list reuse its last entry.
    pub(crate) fn delay_secs(&self, attempt: usize, hint: Option<Duration>) -> u64 {
        let delay = hint
            .or_else(|| self.delays.get(attempt).or(self.delays.last()).copied())
            .unwrap_or_default();

        delay.as_secs_f64().ceil() as u64
    }

    /// Waits before a retry while a ticker emits one countdown event per
    /// second.
    ///
    /// The ticker is stopped and joined before this returns, so it never
    /// emits after the wait resolves. Aborting the request resolves the wait
    /// immediately.
    pub(crate) async fn wait(
        &self,
        attempt: usize,
        hint: Option<Duration>,
        events: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationController,
    ) -> WaitOutcome {
        let seconds = self.delay_secs(attempt, hint);

        if seconds == 0 {
            return WaitOutcome::Elapsed;
        }

        log::debug!("Backing off for {seconds}s before retry {}", attempt + 1);

        let ticker_token = cancel.child_token();
        let ticker = tokio::spawn(countdown(seconds, events.clone(), ticker_token.clone()));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => WaitOutcome::Aborted,
            _ = tokio::time::sleep(Duration::from_secs(seconds)) => WaitOutcome::Elapsed,
        };

        ticker_token.cancel();

        if let Err(error) = ticker.await {
            log::error!("Countdown ticker failed: {error}");
        }

        outcome
    }
}

async fn countdown(seconds: u64, events: mpsc::Sender<StreamEvent>, token: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    for remaining in (1..=seconds).rev() {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            sent = events.send(StreamEvent::Countdown(remaining)) => sent,
        };

        if sent.is_err() {
            return;
        }
    }
}
