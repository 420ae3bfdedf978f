//! Run control: a shared stop token checked by the traversal loop.
//!
//! A stop request (e.g. Ctrl-C in the CLI) makes the traversal stop stepping
//! and drain; in-flight jobs are allowed to finish so nothing is left at a
//! final destination half-written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    stop: AtomicBool,
    notify: Notify,
}

/// Cloneable handle; all clones share one token.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    inner: Arc<Inner>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        if !self.inner.stop.swap(true, Ordering::AcqRel) {
            tracing::info!("stop requested; draining in-flight downloads");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_is_shared_between_clones() {
        let a = RunControl::new();
        let b = a.clone();
        assert!(!b.is_stop_requested());
        a.request_stop();
        assert!(b.is_stop_requested());
    }

    #[tokio::test]
    async fn stopped_wakes_waiters() {
        let control = RunControl::new();
        let waiter = {
            let c = control.clone();
            tokio::spawn(async move { c.stopped().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        control.request_stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        // Already stopped: returns immediately.
        control.stopped().await;
    }
}
