//! Cooperative cancellation
//!
//! Every component owns a local token and watches the relay's root token.
//! Either one firing means "stop": the root covers process shutdown, the local
//! one covers `close()` on that component alone.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Result of racing a future against shutdown
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Completed(T),
    Cancelled,
}

#[derive(Debug, Clone)]
pub(crate) struct Shutdown {
    root: CancellationToken,
    local: CancellationToken,
}

impl Shutdown {
    pub(crate) fn new(root: CancellationToken, local: CancellationToken) -> Self {
        Self { root, local }
    }

    pub(crate) fn is_signalled(&self) -> bool {
        self.root.is_cancelled() || self.local.is_cancelled()
    }

    /// Resolves once either token is cancelled
    pub(crate) async fn signalled(&self) {
        tokio::select! {
            _ = self.root.cancelled() => {}
            _ = self.local.cancelled() => {}
        }
    }

    /// Drive `fut` until it completes or shutdown is signalled
    ///
    /// Shutdown wins when both are ready.
    pub(crate) async fn race<F: Future>(&self, fut: F) -> Outcome<F::Output> {
        tokio::select! {
            biased;
            _ = self.signalled() => Outcome::Cancelled,
            value = fut => Outcome::Completed(value),
        }
    }
}
