//! Drives one request through the credential and retry matrix.

use rotation::{Credential, CredentialPool};
use telemetry::metrics::{DISPATCH_DURATION, Recorder};
use tokio::{sync::mpsc, time::Instant};

use crate::{
    assembler::{Assembled, Payload, ResponseAssembler},
    backoff::{BackoffScheduler, WaitOutcome},
    cancel::CancellationController,
    error::{DispatchError, ProviderError},
    events::StreamEvent,
    metrics::DispatchMetrics,
    provider::{GenerateRequest, Provider},
};

/// Position of a request in the dispatch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchState {
    Idle,
    SelectCredential,
    Attempting,
    FragmentFlowing,
    Backoff,
    RotateCredential,
    Succeeded,
    ExhaustedFailure,
    FatalFailure,
}

/// Bookkeeping for the provider call in flight. Only ever logged.
#[derive(Debug)]
struct AttemptRecord {
    credential_index: usize,
    attempt_number: u32,
    started_at: Instant,
}

/// The result of [`StreamingDispatcher::run`].
#[derive(Debug)]
pub(crate) struct Outcome<P> {
    pub(crate) state: DispatchState,
    pub(crate) provider_calls: u32,
    pub(crate) rotations: u32,
    pub(crate) result: Result<Assembled<P>, DispatchError>,
}

enum AttemptResult {
    Completed,
    Failed(ProviderError),
    Cancelled,
}

pub(crate) struct StreamingDispatcher<'a> {
    provider: &'a dyn Provider,
    pool: &'a CredentialPool,
    backoff: &'a BackoffScheduler,
    max_attempts: u32,
    events: &'a mpsc::Sender<StreamEvent>,
    cancel: &'a CancellationController,
    metrics: &'a DispatchMetrics,
    state: DispatchState,
}

impl<'a> StreamingDispatcher<'a> {
    pub(crate) fn new(
        provider: &'a dyn Provider,
        pool: &'a CredentialPool,
        backoff: &'a BackoffScheduler,
        max_attempts: u32,
        events: &'a mpsc::Sender<StreamEvent>,
        cancel: &'a CancellationController,
        metrics: &'a DispatchMetrics,
    ) -> Self {
        Self {
            provider,
            pool,
            backoff,
            max_attempts: max_attempts.max(1),
            events,
            cancel,
            metrics,
            state: DispatchState::Idle,
        }
    }

    /// Runs attempts until the request succeeds, fails for good or is
    /// cancelled. Terminal events are left to [`conclude`](Self::conclude),
    /// so the caller can act on the outcome before the client sees it.
    pub(crate) async fn run<P: Payload>(&mut self, request: &GenerateRequest) -> Outcome<P> {
        let mut recorder = Recorder::new(DISPATCH_DURATION);
        let mut assembler = ResponseAssembler::default();

        self.transition(DispatchState::SelectCredential);

        let mut rotation = self.pool.rotation().await;
        let mut credential = rotation.current();
        let mut attempt = 0;
        let mut provider_calls = 0;
        let mut rotations = 0;

        let result = loop {
            if self.cancel.is_cancelled() {
                break Err(DispatchError::Cancelled);
            }

            attempt += 1;

            let status = self.status_text(attempt, rotations);

            if !self.emit(StreamEvent::Status(status)).await {
                break Err(DispatchError::Cancelled);
            }

            assembler.reset();
            provider_calls += 1;

            let record = AttemptRecord {
                credential_index: credential.index(),
                attempt_number: attempt,
                started_at: Instant::now(),
            };

            log::debug!("Starting {record:?}");

            let failure = match self.attempt(&credential, request, &mut assembler).await {
                AttemptResult::Completed => {
                    self.metrics.attempt(credential.index(), "success");
                    self.transition(DispatchState::Succeeded);

                    log::debug!(
                        "Provider stream completed with {} characters of reasoning",
                        assembler.reasoning().len()
                    );

                    break assembler.finalize::<P>().map_err(DispatchError::from);
                }
                AttemptResult::Cancelled => break Err(DispatchError::Cancelled),
                AttemptResult::Failed(failure) => failure,
            };

            self.metrics.attempt(credential.index(), failure.kind());

            log::warn!(
                "Provider call {} on credential #{} failed after {:?}: {failure}",
                record.attempt_number,
                record.credential_index,
                record.started_at.elapsed()
            );

            let hint = match &failure {
                ProviderError::RateLimited { retry_after, .. } => *retry_after,
                _ => None,
            };

            match failure {
                ProviderError::Fatal(_) => break Err(DispatchError::Fatal(failure)),
                _ if attempt < self.max_attempts => {
                    self.transition(DispatchState::Backoff);
                    self.metrics.backoff(failure.kind());

                    let outcome = self
                        .backoff
                        .wait((attempt - 1) as usize, hint, self.events, self.cancel)
                        .await;

                    if outcome == WaitOutcome::Aborted {
                        break Err(DispatchError::Cancelled);
                    }
                }
                ProviderError::RateLimited { .. } => {
                    self.transition(DispatchState::RotateCredential);

                    match rotation.advance().await {
                        Ok(next) => {
                            self.metrics.rotation();
                            rotations += 1;
                            attempt = 0;
                            credential = next;
                        }
                        Err(_) => {
                            break Err(DispatchError::Exhausted {
                                calls: provider_calls,
                                last: failure,
                            });
                        }
                    }
                }
                ProviderError::Unavailable(_) => {
                    break Err(DispatchError::Exhausted {
                        calls: provider_calls,
                        last: failure,
                    });
                }
            }
        };

        let state = match &result {
            Ok(_) => DispatchState::Succeeded,
            Err(DispatchError::Exhausted { .. }) => DispatchState::ExhaustedFailure,
            Err(_) => DispatchState::FatalFailure,
        };

        self.transition(state);

        recorder.push_attribute(
            "outcome",
            match &result {
                Ok(_) => "success",
                Err(error) => error.kind(),
            },
        );
        recorder.record();

        Outcome {
            state,
            provider_calls,
            rotations,
            result,
        }
    }

    /// Emits the terminal events for `outcome`. A cancelled request emits
    /// nothing, the client is already gone.
    pub(crate) async fn conclude<P>(&self, outcome: &Outcome<P>) {
        match &outcome.result {
            Ok(assembled) => {
                log::info!(
                    "Request succeeded after {} provider calls and {} rotations",
                    outcome.provider_calls,
                    outcome.rotations
                );

                if self.emit(StreamEvent::Final(assembled.value.clone())).await {
                    self.emit(StreamEvent::Done).await;
                }
            }
            Err(DispatchError::Cancelled) => {
                log::debug!("Request cancelled after {} provider calls", outcome.provider_calls);
            }
            Err(error) => {
                log::error!("Request failed ({}): {error}", error.kind());

                if self.emit(StreamEvent::Error(error.user_message().to_string())).await {
                    self.emit(StreamEvent::Done).await;
                }
            }
        }
    }

    async fn attempt(
        &mut self,
        credential: &Credential,
        request: &GenerateRequest,
        assembler: &mut ResponseAssembler,
    ) -> AttemptResult {
        self.transition(DispatchState::Attempting);

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return AttemptResult::Cancelled,
            opened = self.provider.open(credential, request) => opened,
        };

        let mut session = match opened {
            Ok(session) => session,
            Err(error) => return AttemptResult::Failed(error),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    session.abort();
                    return AttemptResult::Cancelled;
                }
                next = session.next_fragment() => next,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(error)) => return AttemptResult::Failed(error),
                None => return AttemptResult::Completed,
            };

            if self.state == DispatchState::Attempting {
                self.transition(DispatchState::FragmentFlowing);
            }

            assembler.push(&fragment);

            if !self.emit(StreamEvent::Fragment(fragment)).await {
                session.abort();
                return AttemptResult::Cancelled;
            }
        }
    }

    /// Sends an event to the relay. Returns false once the request is
    /// cancelled or the client has gone away.
    async fn emit(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        if self.events.send(event).await.is_err() {
            log::debug!("Event relay closed, cancelling the request");
            self.cancel.cancel();

            return false;
        }

        true
    }

    fn status_text(&self, attempt: u32, rotations: u32) -> String {
        match (attempt, rotations) {
            (1, 0) => format!("Contacting {}", self.provider.name()),
            (1, _) => "Switching to another API key".to_string(),
            _ => format!("Retrying (attempt {attempt} of {})", self.max_attempts),
        }
    }

    fn transition(&mut self, next: DispatchState) {
        if self.state != next {
            log::debug!("Dispatch state {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }
}
