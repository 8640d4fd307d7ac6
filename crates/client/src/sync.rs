//! Offline write queue and background-sync replay.
//!
//! Writes that could not reach the server are persisted under a sync tag and
//! POSTed again, oldest first, when a sync event for that tag arrives. An item
//! leaves the queue only after the server accepted it with a 2xx; anything
//! else keeps it for the next sync. Items never expire.

use crate::fetch::{FetchRequest, Network};
use offcache_core::{CacheDb, Error, PendingWrite};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one replay pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub tag: String,
    pub attempted: usize,
    pub replayed: usize,
    pub failed: usize,
    /// Items still pending after the pass, including ones enqueued meanwhile.
    pub remaining: u64,
}

/// Durable queue of JSON payloads awaiting replay.
#[derive(Clone)]
pub struct OfflineQueue {
    db: CacheDb,
    network: Arc<dyn Network>,
    endpoint: Url,
}

impl OfflineQueue {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, endpoint: Url) -> Self {
        Self { db, network, endpoint }
    }

    /// Persist a payload under `tag`. Returns the queue id.
    pub async fn enqueue(&self, tag: &str, payload: &serde_json::Value) -> Result<i64, Error> {
        let id = self.db.enqueue_write(tag, payload).await?;
        tracing::info!(tag, id, "queued write for background sync");
        Ok(id)
    }

    /// Pending items for `tag`, oldest first.
    pub async fn pending(&self, tag: &str) -> Result<Vec<PendingWrite>, Error> {
        self.db.pending_writes(tag).await
    }

    /// POST every pending item for `tag` to the sync endpoint.
    ///
    /// Per-item failures are logged and leave the item queued; only a
    /// failure to read or update the queue itself is returned as an error.
    pub async fn replay_all(&self, tag: &str) -> Result<ReplayReport, Error> {
        let items = self.db.pending_writes(tag).await?;
        let mut report =
            ReplayReport { tag: tag.to_string(), attempted: items.len(), replayed: 0, failed: 0, remaining: 0 };

        for item in items {
            if self.replay_one(&item).await {
                self.db.remove_pending_write(item.id).await?;
                report.replayed += 1;
            } else {
                report.failed += 1;
            }
        }

        report.remaining = self.db.count_pending_writes(tag).await?;
        tracing::info!(
            tag,
            attempted = report.attempted,
            replayed = report.replayed,
            failed = report.failed,
            remaining = report.remaining,
            "sync replay finished"
        );
        Ok(report)
    }

    async fn replay_one(&self, item: &PendingWrite) -> bool {
        let request = match FetchRequest::post_json(self.endpoint.clone(), &item.payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(id = item.id, error = %e, "unencodable queued payload");
                return false;
            }
        };

        match self.network.fetch(&request).await {
            Ok(response) if response.status.is_success() => {
                tracing::debug!(id = item.id, "queued write accepted");
                true
            }
            Ok(response) => {
                tracing::warn!(id = item.id, status = response.status.as_u16(), "queued write rejected, keeping");
                false
            }
            Err(e) => {
                tracing::warn!(id = item.id, error = %e, "queued write failed, keeping");
                false
            }
        }
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue").field("endpoint", &self.endpoint.as_str()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedNetwork;
    use serde_json::json;

    const ENDPOINT: &str = "http://localhost:3000/api/bookings";

    async fn queue(network: Arc<ScriptedNetwork>) -> OfflineQueue {
        let db = CacheDb::open_in_memory().await.unwrap();
        OfflineQueue::new(db, network, Url::parse(ENDPOINT).unwrap())
    }

    #[tokio::test]
    async fn test_only_rejected_item_remains() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond_with(|request| {
            let body: serde_json::Value = serde_json::from_slice(request.body.as_deref().unwrap_or_default()).unwrap();
            if body["n"] == 2 { Ok((201, b"created".to_vec())) } else { Err(Error::Network("unreachable".into())) }
        });
        let queue = queue(network.clone()).await;

        let first = queue.enqueue("booking-sync", &json!({"n": 1})).await.unwrap();
        queue.enqueue("booking-sync", &json!({"n": 2})).await.unwrap();

        let report = queue.replay_all("booking-sync").await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.replayed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);

        let pending = queue.pending("booking-sync").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[0].payload, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_replay_posts_json_oldest_first() {
        let network = Arc::new(ScriptedNetwork::new());
        network.route(ENDPOINT, 200, "ok");
        let queue = queue(network.clone()).await;

        for n in 1..=3 {
            queue.enqueue("booking-sync", &json!({"n": n})).await.unwrap();
        }

        let report = queue.replay_all("booking-sync").await.unwrap();
        assert_eq!(report.replayed, 3);
        assert_eq!(report.remaining, 0);

        let calls = network.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(method, url)| method == reqwest::Method::POST && url == ENDPOINT));
    }

    #[tokio::test]
    async fn test_non_2xx_keeps_item() {
        let network = Arc::new(ScriptedNetwork::new());
        network.route(ENDPOINT, 503, "busy");
        let queue = queue(network).await;
        queue.enqueue("booking-sync", &json!({"seats": 1})).await.unwrap();

        let report = queue.replay_all("booking-sync").await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(queue.pending("booking-sync").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_is_tag_scoped() {
        let network = Arc::new(ScriptedNetwork::new());
        network.route(ENDPOINT, 200, "ok");
        let queue = queue(network).await;
        queue.enqueue("booking-sync", &json!({"a": 1})).await.unwrap();
        queue.enqueue("other", &json!({"b": 2})).await.unwrap();

        queue.replay_all("booking-sync").await.unwrap();
        assert!(queue.pending("booking-sync").await.unwrap().is_empty());
        assert_eq!(queue.pending("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_during_replay_is_kept() {
        let network = Arc::new(ScriptedNetwork::new());
        network.route(ENDPOINT, 201, "created");
        network.set_latency(std::time::Duration::from_millis(100));
        let queue = queue(network.clone()).await;
        queue.enqueue("booking-sync", &json!({"n": 1})).await.unwrap();

        let replay = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.replay_all("booking-sync").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let late = queue.enqueue("booking-sync", &json!({"n": 2})).await.unwrap();

        let report = replay.await.unwrap().unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 1);

        let pending = queue.pending("booking-sync").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late);

        let report = queue.replay_all("booking-sync").await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(network.calls_to(ENDPOINT), 2);
    }

    #[tokio::test]
    async fn test_empty_replay() {
        let queue = queue(Arc::new(ScriptedNetwork::new())).await;
        let report = queue.replay_all("booking-sync").await.unwrap();
        assert_eq!(
            report,
            ReplayReport { tag: "booking-sync".into(), attempted: 0, replayed: 0, failed: 0, remaining: 0 }
        );
    }
}
