//! Cancellation of local deployment waiting.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable token the caller uses to stop waiting on a deployment.
///
/// Cancelling only stops local work; nothing is sent to the remote API.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    notify: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { notify: Arc::new(tx) }
    }

    /// Cancel every clone of this token.
    pub fn cancel(&self) {
        self.notify.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.notify.borrow()
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.notify.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
