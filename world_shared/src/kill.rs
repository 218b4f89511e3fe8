//! Per-connection shutdown signal.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::watch;
use tracing::warn;

#[derive(Debug)]
struct Inner {
    closing: AtomicBool,
    tx: watch::Sender<bool>,
}

/// One-shot, cloneable close signal shared by a connection's tasks.
///
/// The first [`close`](KillSignal::close) wakes every waiter; later calls are
/// reported and otherwise ignored.
#[derive(Debug, Clone)]
pub struct KillSignal {
    inner: Arc<Inner>,
}

impl Default for KillSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl KillSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                closing: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Fires the signal. Returns `false` if it had already fired.
    pub fn close(&self) -> bool {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            warn!("Kill signal closed more than once");
            return false;
        }
        self.inner.tx.send_replace(true);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire)
    }

    /// Resolves once the signal has fired.
    pub async fn closed(&self) {
        let mut rx = self.inner.tx.subscribe();
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn close_is_idempotent_and_wakes_waiters() {
        let kill = KillSignal::new();
        let waiter = {
            let kill = kill.clone();
            tokio::spawn(async move { kill.closed().await })
        };
        assert!(!kill.is_closed());
        assert!(kill.close());
        assert!(!kill.close());
        assert!(kill.is_closed());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn waiting_after_close_returns_immediately() {
        let kill = KillSignal::new();
        kill.close();
        tokio::time::timeout(Duration::from_millis(100), kill.closed())
            .await
            .expect("already closed");
    }
}
