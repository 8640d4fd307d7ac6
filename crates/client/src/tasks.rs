//! Background work that must settle before an event counts as handled.
//!
//! Handlers may return to their caller before all of their work is done
//! (a stale-while-revalidate refresh, for instance). Such work is spawned here
//! so the host can keep the worker alive until it settles. Any number of
//! callers may wait at once; each returns only when nothing is in flight.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
struct Inflight {
    count: AtomicUsize,
    idle: Notify,
}

/// Shared set of in-flight background tasks.
#[derive(Clone, Default)]
pub struct PendingWork {
    inflight: Arc<Inflight>,
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` and track it until it finishes.
    ///
    /// Tasks are detached from whoever waits on them; dropping a `settle`
    /// future never cancels work.
    pub fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inflight.count.fetch_add(1, Ordering::SeqCst);
        let task = tokio::spawn(work);
        let inflight = self.inflight.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "background task failed");
            }
            if inflight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                inflight.idle.notify_waiters();
            }
        });
    }

    /// Number of tasks still in flight.
    pub fn len(&self) -> usize {
        self.inflight.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until nothing is in flight, including tasks spawned while waiting.
    pub async fn settle(&self) {
        loop {
            let mut idle = std::pin::pin!(self.inflight.idle.notified());
            idle.as_mut().enable();
            if self.is_empty() {
                return;
            }
            idle.await;
        }
    }
}

impl std::fmt::Debug for PendingWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWork").field("len", &self.len()).finish()
    }
}
