//! Shutdown coordination and the single-assignment completion signal.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Background loops hold a child token and exit once it is cancelled.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled when [`Shutdown::trigger`] is called.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }
}

/// Create a completion signal: many writers, one reader, one value.
pub fn completion<T>() -> (CompletionSender<T>, CompletionReceiver<T>) {
    let (tx, rx) = oneshot::channel();
    (
        CompletionSender {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        CompletionReceiver { rx },
    )
}

/// Write side of the completion signal.
///
/// The first write wins; later writes are dropped without blocking.
#[derive(Debug)]
pub struct CompletionSender<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for CompletionSender<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> CompletionSender<T> {
    /// Record `value` if nothing was recorded yet. Returns whether it was kept.
    pub fn complete(&self, value: T) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

/// Read side of the completion signal.
#[derive(Debug)]
pub struct CompletionReceiver<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> CompletionReceiver<T> {
    /// Wait for the first recorded value.
    ///
    /// Returns `None` if every sender was dropped without writing.
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_write_is_discarded() {
        let (tx, rx) = completion::<Result<(), String>>();
        let other = tx.clone();

        assert!(tx.complete(Ok(())));
        assert!(!other.complete(Err("late".into())));
        assert_eq!(rx.wait().await, Some(Ok(())));
    }

    #[tokio::test]
    async fn dropped_senders_end_wait() {
        let (tx, rx) = completion::<()>();
        drop(tx);
        assert_eq!(rx.wait().await, None);
    }

    #[tokio::test]
    async fn subscribers_see_trigger() {
        let shutdown = Shutdown::new();
        let token = shutdown.subscribe();
        assert!(!token.is_cancelled());

        shutdown.trigger();
        token.cancelled().await;
        assert!(shutdown.is_triggered());
    }
}
