//! Named cache stores and their lifecycle.
//!
//! Stores are created on open, listed in creation order, and deleted
//! wholesale when a newer worker generation activates. Captures only land in
//! stores that still exist, so a deleted generation stays deleted.

use super::connection::CacheDb;
use super::entries::{CachedEntry, RequestIdentity, StoredResponse, now_timestamp, upsert_entry};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A handle to one open store.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    name: String,
}

impl CacheStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capture a response. Non-2xx responses are ignored and `false` returned.
    ///
    /// Fails with `Error::InvalidState` once the store has been deleted.
    pub async fn put(&self, identity: &RequestIdentity, response: &StoredResponse) -> Result<bool, Error> {
        self.db.put_entry(&self.name, identity, response).await
    }

    pub async fn matching(&self, identity: &RequestIdentity) -> Result<Option<CachedEntry>, Error> {
        self.db.match_entry(&self.name, identity).await
    }

    pub async fn len(&self) -> Result<u64, Error> {
        self.db.count_entries(&self.name).await
    }

    /// Write a batch of captures in one transaction.
    ///
    /// Either every entry lands or none does. The whole batch is rejected if
    /// any response is not a 2xx.
    pub async fn populate(&self, entries: Vec<(RequestIdentity, StoredResponse)>) -> Result<usize, Error> {
        if let Some((identity, response)) = entries.iter().find(|(_, r)| !r.is_success()) {
            return Err(Error::InvalidInput(format!("{identity} returned status {}", response.status)));
        }

        let mut encoded = Vec::with_capacity(entries.len());
        for (identity, response) in entries {
            let headers_json = serde_json::to_string(&response.headers)?;
            encoded.push((identity, response, headers_json));
        }

        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                let captured_at = now_timestamp();
                tx.execute(
                    "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
                    params![name, captured_at],
                )?;
                for (identity, response, headers_json) in &encoded {
                    upsert_entry(&tx, &name, identity, response, headers_json, &captured_at)?;
                }
                tx.commit()?;
                Ok(encoded.len())
            })
            .await
            .map_err(Error::from)
    }
}

/// Approximate storage usage, mirroring the browser storage estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StorageEstimate {
    pub usage_bytes: u64,
    pub quota_bytes: u64,
    pub usage_percentage: f64,
}

impl CacheDb {
    /// Handle to a store by name without creating it.
    pub fn store(&self, name: &str) -> CacheStore {
        CacheStore { db: self.clone(), name: name.to_string() }
    }

    /// Open a store, creating it if it does not exist yet.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        let name = name.to_string();
        let created = name.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
                    params![created, now_timestamp()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheStore { db: self.clone(), name })
    }

    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// All store names in creation order.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY seq ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and every entry in it. Returns whether it existed.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let n = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(n > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every store whose name is not in `keep`.
    ///
    /// Returns the deleted names in creation order.
    pub async fn delete_stores_not_in(&self, keep: &[&str]) -> Result<Vec<String>, Error> {
        let keep: Vec<String> = keep.iter().map(|s| s.to_string()).collect();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let stale: Vec<String> = {
                    let mut stmt = tx.prepare("SELECT name FROM cache_stores ORDER BY seq ASC")?;
                    stmt.query_map([], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                        .into_iter()
                        .filter(|name| !keep.contains(name))
                        .collect()
                };
                for name in &stale {
                    tx.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                }
                tx.commit()?;
                Ok(stale)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every store. Returns how many were removed.
    pub async fn clear_all_stores(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let n = conn.execute("DELETE FROM cache_stores", [])?;
                Ok(n as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Bytes held by captured entries against a configured quota.
    pub async fn storage_estimate(&self, quota_bytes: u64) -> Result<StorageEstimate, Error> {
        let usage: i64 = self
            .conn
            .call(|conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(length(body) + length(headers_json) + length(url)), 0) FROM cache_entries",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(Error::Database)?;

        let usage_bytes = usage as u64;
        let usage_percentage =
            if quota_bytes > 0 { (usage_bytes as f64 / quota_bytes as f64) * 100.0 } else { 0.0 };

        Ok(StorageEstimate { usage_bytes, quota_bytes, usage_percentage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response(body: &str) -> StoredResponse {
        StoredResponse { status: 200, headers: Vec::new(), body: body.as_bytes().to_vec() }
    }

    #[tokio::test]
    async fn test_open_store_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("app-static-v1").await.unwrap();
        db.open_store("app-static-v1").await.unwrap();

        assert_eq!(db.store_names().await.unwrap(), vec!["app-static-v1"]);
        assert!(db.has_store("app-static-v1").await.unwrap());
        assert!(!db.has_store("app-static-v2").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_stores_not_in_removes_only_stale() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for name in ["v1-static", "v2-static", "v1-dynamic"] {
            let store = db.open_store(name).await.unwrap();
            store
                .put(&RequestIdentity::get("https://example.com/x"), &ok_response(name))
                .await
                .unwrap();
        }

        let deleted = db.delete_stores_not_in(&["v2-static", "v1-dynamic"]).await.unwrap();
        assert_eq!(deleted, vec!["v1-static"]);
        assert_eq!(db.store_names().await.unwrap(), vec!["v2-static", "v1-dynamic"]);

        // Entries of the deleted store cascade away.
        assert!(
            db.match_entry("v1-static", &RequestIdentity::get("https://example.com/x"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_handle_outlives_deleted_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("app-dynamic-v1").await.unwrap();
        let id = RequestIdentity::get("https://example.com/");
        assert!(store.put(&id, &ok_response("v1")).await.unwrap());
        assert_eq!(store.matching(&id).await.unwrap().unwrap().body, b"v1");

        db.delete_stores_not_in(&["app-dynamic-v2"]).await.unwrap();
        assert!(matches!(store.put(&id, &ok_response("late")).await, Err(Error::InvalidState(_))));
        assert!(store.matching(&id).await.unwrap().is_none());
        assert!(!db.has_store("app-dynamic-v1").await.unwrap());

        let unopened = db.store("never-opened");
        assert!(unopened.put(&id, &ok_response("x")).await.is_err());
        assert!(db.store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_populate_all_or_nothing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("app-static-v1").await.unwrap();

        let batch = vec![
            (RequestIdentity::get("https://example.com/"), ok_response("shell")),
            (
                RequestIdentity::get("https://example.com/missing.css"),
                StoredResponse { status: 404, headers: Vec::new(), body: Vec::new() },
            ),
        ];
        assert!(store.populate(batch).await.is_err());
        assert_eq!(store.len().await.unwrap(), 0);

        let batch = vec![
            (RequestIdentity::get("https://example.com/"), ok_response("shell")),
            (RequestIdentity::get("https://example.com/main.css"), ok_response("body{}")),
        ];
        assert_eq!(store.populate(batch).await.unwrap(), 2);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear_all_and_estimate() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("s").await.unwrap();
        store
            .put(&RequestIdentity::get("https://example.com/a"), &ok_response("0123456789"))
            .await
            .unwrap();

        let estimate = db.storage_estimate(1000).await.unwrap();
        assert!(estimate.usage_bytes >= 10);
        assert!(estimate.usage_percentage > 0.0);

        assert_eq!(db.clear_all_stores().await.unwrap(), 1);
        assert_eq!(db.storage_estimate(1000).await.unwrap().usage_bytes, 0);
        assert_eq!(db.storage_estimate(0).await.unwrap().usage_percentage, 0.0);
    }
}
