//! Debounced preview scheduling
//!
//! Each `schedule` call supersedes the previous pending one. A timer that has
//! already fired is never interrupted; its recompute runs to completion and
//! stale results are filtered by the studio's request ordering.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Trailing-edge debouncer
pub struct PreviewScheduler {
    quiet_interval: Duration,
    /// Cancel signal for the pending timer, if any
    pending: Mutex<Option<oneshot::Sender<()>>>,
}

impl PreviewScheduler {
    pub fn new(quiet_interval: Duration) -> Self {
        Self {
            quiet_interval,
            pending: Mutex::new(None),
        }
    }

    /// Run `task` once the quiet interval passes without another call
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, task: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        self.replace(Some(cancel_tx));

        let quiet = self.quiet_interval;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(quiet) => {
                    log::debug!("[scheduler] Quiet interval elapsed, recomputing preview");
                    task().await;
                }
                _ = cancel_rx => {
                    log::trace!("[scheduler] Pending recompute superseded");
                }
            }
        })
    }

    /// Drop the pending timer without running it
    pub fn cancel(&self) {
        self.replace(None);
    }

    fn replace(&self, next: Option<oneshot::Sender<()>>) {
        let previous = match self.pending.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        };
        if let Some(tx) = previous {
            // Receiver is gone once the timer has fired
            let _ = tx.send(());
        }
    }
}
