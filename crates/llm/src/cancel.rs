use tokio_util::sync::CancellationToken;

/// Single-shot abort signal shared by the relay, the dispatcher and any
/// backoff wait of one request.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Signals abort. Calls after the first one have no effect.
    pub(crate) fn cancel(&self) {
        if self.token.is_cancelled() {
            return;
        }

        log::debug!("Cancelling in-flight request");
        self.token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// A token cancelled together with this controller, which can also be
    /// cancelled on its own.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
