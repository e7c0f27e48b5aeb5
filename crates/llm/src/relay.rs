//! Relays dispatcher events to the client as server-sent events.

use std::{
    convert::Infallible,
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    cancel::CancellationController,
    events::{Channel, StreamEvent},
};

/// Events buffered between the dispatcher and a slow client.
const EVENT_BUFFER: usize = 64;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const INTERNAL_ERROR: &str = "An unexpected error occurred. Please try again.";

/// The client side of one request's event channel.
///
/// Dropping the relay before `[DONE]` was written means the client went
/// away, and the request is cancelled.
pub(crate) struct EventRelay {
    events: ReceiverStream<StreamEvent>,
    channel: Channel,
    cancel: CancellationController,
    finished: bool,
}

impl EventRelay {
    /// Runs `task` in the background and relays the events it sends.
    ///
    /// If the task panics, the client still receives an error followed by
    /// `[DONE]`.
    pub(crate) fn spawn<F, Fut>(channel: Channel, cancel: CancellationController, task: F) -> Self
    where
        F: FnOnce(mpsc::Sender<StreamEvent>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let supervisor = tx.clone();
        let handle = tokio::spawn(task(tx));

        tokio::spawn(async move {
            let Err(error) = handle.await else {
                return;
            };

            if !error.is_panic() {
                return;
            }

            log::error!("Dispatch task panicked: {error}");

            if supervisor.send(StreamEvent::Error(INTERNAL_ERROR.to_string())).await.is_ok() {
                supervisor.send(StreamEvent::Done).await.ok();
            }
        });

        Self {
            events: ReceiverStream::new(rx),
            channel,
            cancel,
            finished: false,
        }
    }

    /// Wraps the relay into an SSE response with periodic keep-alive comments.
    pub(crate) fn into_sse(self) -> Sse<Self> {
        Sse::new(self).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
    }

    /// Next `data:` payload, skipping events the channel does not relay.
    fn poll_data(&mut self, cx: &mut Context<'_>) -> Poll<Option<String>> {
        loop {
            if self.finished {
                return Poll::Ready(None);
            }

            let Some(event) = ready!(Pin::new(&mut self.events).poll_next(cx)) else {
                self.finished = true;
                return Poll::Ready(None);
            };

            if event == StreamEvent::Done {
                self.finished = true;
            }

            if let Some(data) = event.to_wire(self.channel) {
                return Poll::Ready(Some(data));
            }
        }
    }
}

impl Stream for EventRelay {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let data = ready!(self.get_mut().poll_data(cx));
        Poll::Ready(data.map(|data| Ok(Event::default().data(data))))
    }
}

impl Drop for EventRelay {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("Client disconnected before the stream completed");
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::poll_fn;
    use serde_json::json;

    use super::EventRelay;
    use crate::{
        cancel::CancellationController,
        events::{Channel, Fragment, StreamEvent},
    };

    async fn collect(mut relay: EventRelay) -> Vec<String> {
        let mut lines = Vec::new();

        while let Some(data) = poll_fn(|cx| relay.poll_data(cx)).await {
            lines.push(data);
        }

        lines
    }

    #[tokio::test]
    async fn events_are_relayed_in_order() {
        let relay = EventRelay::spawn(Channel::Extraction, CancellationController::new(), |tx| async move {
            let events = [
                StreamEvent::Status("Contacting gemini".to_string()),
                StreamEvent::Fragment(Fragment::reasoning("Reading")),
                StreamEvent::Fragment(Fragment::answer("{")),
                StreamEvent::Final(json!({ "principalAmount": 1 })),
                StreamEvent::Done,
            ];

            for event in events {
                tx.send(event).await.unwrap();
            }
        });

        insta::assert_json_snapshot!(collect(relay).await, @r#"
        [
          "{\"status\":\"Contacting gemini\"}",
          "{\"thinking\":\"Reading\"}",
          "{\"final\":{\"principalAmount\":1}}",
          "[DONE]"
        ]
        "#);
    }

    #[tokio::test]
    async fn nothing_is_relayed_after_done() {
        let relay = EventRelay::spawn(Channel::Chat, CancellationController::new(), |tx| async move {
            tx.send(StreamEvent::Done).await.unwrap();
            tx.send(StreamEvent::Status("late".to_string())).await.ok();
        });

        assert_eq!(collect(relay).await, vec!["[DONE]".to_string()]);
    }

    #[tokio::test]
    async fn dropping_an_unfinished_relay_cancels() {
        let cancel = CancellationController::new();
        let observer = cancel.clone();

        let relay = EventRelay::spawn(Channel::Chat, cancel, |tx| async move {
            tx.send(StreamEvent::Status("working".to_string())).await.ok();
        });

        drop(relay);

        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn finished_relay_does_not_cancel() {
        let cancel = CancellationController::new();
        let observer = cancel.clone();

        let relay = EventRelay::spawn(Channel::Chat, cancel, |tx| async move {
            tx.send(StreamEvent::Done).await.unwrap();
        });

        collect(relay).await;

        assert!(!observer.is_cancelled());
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn panicking_task_still_closes_the_stream() {
        let relay = EventRelay::spawn(Channel::Chat, CancellationController::new(), |tx| async move {
            tx.send(StreamEvent::Status("working".to_string())).await.unwrap();
            panic!("dispatcher bug");
        });

        insta::assert_json_snapshot!(collect(relay).await, @r#"
        [
          "{\"status\":\"working\"}",
          "{\"error\":\"An unexpected error occurred. Please try again.\"}",
          "[DONE]"
        ]
        "#);
    }
}
