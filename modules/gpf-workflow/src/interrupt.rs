//! Edge-triggered interrupt handle for monitoring loops.
//!
//! `fire()` is called from a Ctrl+C handler (or a test); each firing wakes at
//! most one pending `wait()`. Edge semantics matter: when the user chooses to
//! keep polling after an interrupt, the loop must not see the same firing
//! again on its next iteration.

use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct InterruptSignal {
    notify: Arc<Notify>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal an interrupt. Stored until consumed if nobody is waiting.
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next firing (consumes it).
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Forward the process Ctrl+C signal to this handle, once.
    pub fn listen_to_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.fire();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fired_signal_is_consumed_once() {
        let signal = InterruptSignal::new();
        signal.fire();
        signal.wait().await;

        // a second wait must not complete from the same firing
        let second = tokio::time::timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(second.is_err());
    }
}
