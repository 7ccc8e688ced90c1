//! Shutdown triggering.
//!
//! A [`ShutdownHandle`] is the externally visible trigger for a run:
//! the CLI ties one to Ctrl-C, tests call it directly, and the engine
//! itself fires it on pipeline timeout or a `halt`-policy fault. The
//! underlying watch channel makes triggering idempotent and
//! observable from any task.

use tokio::sync::watch;

/// Cloneable trigger for engine-wide shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Creates an untriggered handle.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribes a watcher; completes `changed()` on trigger.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Waits until shutdown is requested.
    pub async fn triggered(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_triggered());

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.triggered().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.trigger();

        waiter.await.unwrap();
        assert!(handle.is_triggered());
    }

    #[tokio::test]
    async fn triggered_returns_immediately_when_already_fired() {
        let handle = ShutdownHandle::new();
        handle.trigger();
        handle.trigger();
        handle.triggered().await;
    }
}
