//! Cooperative cancellation for sync runs.

use crate::sync::SyncError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// One-shot cancellation signal shared between a running sync and whoever may stop it.
///
/// Cancelling is idempotent. The run observes the signal at step and batch boundaries through
/// `check`, and while waiting on the network through `run_until_cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Later calls are no-ops.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(SyncError::Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel cannot slip between.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `fut` to completion unless cancellation comes first, in which case `fut` is dropped.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, SyncError> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(SyncError::Cancelled),
            output = fut => Ok(output),
        }
    }
}
