//! Cooperative cancellation (spec §5): on SIGINT/SIGTERM to the runner, the
//! in-flight child is SIGTERMed-then-SIGKILLed on the same grace period as a
//! timeout, the current group's workdir is still cleaned up, and no further
//! groups or commands are started.
//!
//! A single flag shared between the signal-listening task and every await
//! point that needs to race against it (`child.wait()`, the group loop, the
//! command loop), following the teacher's `tokio::select!`-around-a-signal
//! shape in `process.rs`'s own timeout handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested; resolves immediately
    /// if it already has been, so callers can `tokio::select!` against it
    /// repeatedly without missing a signal raised before the select began.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }

    /// Spawn a background task that calls [`Cancellation::cancel`] on the
    /// runner's first SIGINT or SIGTERM.
    pub fn install_signal_handlers(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("failed to install SIGTERM handler: {e}");
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("received SIGINT, cancelling remaining work");
                }
                _ = sigterm.recv() => {
                    tracing::warn!("received SIGTERM, cancelling remaining work");
                }
            }
            this.cancel();
        });
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_immediately_once_already_cancelled() {
        let c = Cancellation::new();
        c.cancel();
        assert!(c.is_cancelled());
        c.cancelled().await;
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter_on_cancel() {
        let c = Cancellation::new();
        let waiter = c.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        c.cancel();
        handle.await.unwrap();
    }
}
