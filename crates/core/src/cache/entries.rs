//! Cached response entries.
//!
//! An entry is an immutable snapshot of a successful response keyed by
//! request identity inside one named store. Re-capturing the same identity
//! replaces the previous snapshot in a single statement; there is no merging
//! and no partial write.

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

/// Method and canonical URL of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub method: String,
    pub url: String,
}

impl RequestIdentity {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self { method: method.into().to_ascii_uppercase(), url: url.into() }
    }

    /// Shorthand for the only method the stores accept.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Content-addressed key used as the row identity.
    pub fn key(&self) -> String {
        compute_request_key(&self.method, &self.url)
    }
}

impl std::fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Response data as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// Only 2xx responses may be captured.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A captured response read back from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub store_name: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub captured_at: String,
}

/// Timestamps are stored with fixed precision so they sort lexically.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(CachedEntry, String)> {
    let headers_json: String = row.get(4)?;
    Ok((
        CachedEntry {
            store_name: row.get(0)?,
            method: row.get(1)?,
            url: row.get(2)?,
            status: row.get(3)?,
            headers: Vec::new(),
            body: row.get(5)?,
            captured_at: row.get(6)?,
        },
        headers_json,
    ))
}

fn decode_entry(raw: rusqlite::Result<(CachedEntry, String)>) -> Result<Option<CachedEntry>, Error> {
    match raw {
        Ok((mut entry, headers_json)) => {
            entry.headers = serde_json::from_str(&headers_json)?;
            Ok(Some(entry))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn upsert_entry(
    conn: &rusqlite::Connection, store_name: &str, identity: &RequestIdentity, response: &StoredResponse,
    headers_json: &str, captured_at: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cache_entries (store_name, key_hash, method, url, status, headers_json, body, captured_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(store_name, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            captured_at = excluded.captured_at",
        params![
            store_name,
            identity.key(),
            &identity.method,
            &identity.url,
            response.status,
            headers_json,
            &response.body,
            captured_at,
        ],
    )?;
    Ok(())
}

fn host_in_domain(url: &str, domain: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some(host) => host == domain || host.strip_suffix(domain).is_some_and(|rest| rest.ends_with('.')),
        None => false,
    }
}

impl CacheDb {
    /// Capture a response into an existing store.
    ///
    /// Returns `false` without touching the database when the response is
    /// not a 2xx. A store that was never opened, or was deleted since, is
    /// never recreated here: the capture fails with `Error::InvalidState`.
    pub async fn put_entry(
        &self, store_name: &str, identity: &RequestIdentity, response: &StoredResponse,
    ) -> Result<bool, Error> {
        if !response.is_success() {
            tracing::debug!(status = response.status, %identity, "not caching unsuccessful response");
            return Ok(false);
        }

        let store_name = store_name.to_string();
        let identity = identity.clone();
        let response = response.clone();
        let headers_json = serde_json::to_string(&response.headers)?;
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![store_name],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(Error::InvalidState(format!("cache store {store_name} does not exist")));
                }
                upsert_entry(&tx, &store_name, &identity, &response, &headers_json, &now_timestamp())?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a request in a single store.
    pub async fn match_entry(
        &self, store_name: &str, identity: &RequestIdentity,
    ) -> Result<Option<CachedEntry>, Error> {
        let store_name = store_name.to_string();
        let key = identity.key();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let raw = conn.query_row(
                    "SELECT store_name, method, url, status, headers_json, body, captured_at
                     FROM cache_entries WHERE store_name = ?1 AND key_hash = ?2",
                    params![store_name, key],
                    row_to_entry,
                );
                decode_entry(raw)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a request in every store, oldest store first.
    pub async fn match_across_stores(&self, identity: &RequestIdentity) -> Result<Option<CachedEntry>, Error> {
        let key = identity.key();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let raw = conn.query_row(
                    "SELECT e.store_name, e.method, e.url, e.status, e.headers_json, e.body, e.captured_at
                     FROM cache_entries e JOIN cache_stores s ON s.name = e.store_name
                     WHERE e.key_hash = ?1
                     ORDER BY s.seq ASC LIMIT 1",
                    params![key],
                    row_to_entry,
                );
                decode_entry(raw)
            })
            .await
            .map_err(Error::from)
    }

    /// Count entries in a store.
    pub async fn count_entries(&self, store_name: &str) -> Result<u64, Error> {
        let store_name = store_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE store_name = ?1",
                    params![store_name],
                    |row| row.get(0),
                )?;
                Ok(n as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries in every store whose URL host is `domain` or one of
    /// its subdomains.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_entries_by_domain(&self, domain: &str) -> Result<u64, Error> {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return Err(Error::InvalidInput("domain must not be empty".into()));
        }

        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let matching: Vec<i64> = {
                    let mut stmt = tx.prepare("SELECT rowid, url FROM cache_entries")?;
                    stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                        .collect::<Result<Vec<_>, _>>()?
                        .into_iter()
                        .filter(|(_, url)| host_in_domain(url, &domain))
                        .map(|(rowid, _)| rowid)
                        .collect()
                };
                for rowid in &matching {
                    tx.execute("DELETE FROM cache_entries WHERE rowid = ?1", params![rowid])?;
                }
                tx.commit()?;
                Ok(matching.len() as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop the oldest captures of a store until it holds at most `max_entries`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru_entries(&self, store_name: &str, max_entries: usize) -> Result<u64, Error> {
        let store_name = store_name.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE store_name = ?1",
                    params![store_name],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE rowid IN (
                        SELECT rowid FROM cache_entries WHERE store_name = ?1
                        ORDER BY captured_at ASC, rowid ASC LIMIT ?2
                    )",
                    params![store_name, count - max],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response(body: &str) -> StoredResponse {
        StoredResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    async fn db_with_stores(names: &[&str]) -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        for name in names {
            db.open_store(name).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_put_and_match_round_trip() {
        let db = db_with_stores(&["app-dynamic-v1"]).await;
        let id = RequestIdentity::get("https://example.com/api/services");
        let response = ok_response("[1,2,3]");

        assert!(db.put_entry("app-dynamic-v1", &id, &response).await.unwrap());

        let entry = db.match_entry("app-dynamic-v1", &id).await.unwrap().unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, response.body);
        assert_eq!(entry.headers, response.headers);
        assert_eq!(entry.store_name, "app-dynamic-v1");
    }

    #[tokio::test]
    async fn test_unsuccessful_responses_not_stored() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id = RequestIdentity::get("https://example.com/missing");

        for status in [404, 500, 301] {
            let response = StoredResponse { status, headers: Vec::new(), body: b"error page".to_vec() };
            assert!(!db.put_entry("app-static-v1", &id, &response).await.unwrap());
        }

        assert!(db.match_across_stores(&id).await.unwrap().is_none());
        assert!(db.store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_capture() {
        let db = db_with_stores(&["app-dynamic-v1"]).await;
        let id = RequestIdentity::get("https://example.com/");

        db.put_entry("app-dynamic-v1", &id, &ok_response("old")).await.unwrap();
        db.put_entry("app-dynamic-v1", &id, &ok_response("new")).await.unwrap();

        let entry = db.match_entry("app-dynamic-v1", &id).await.unwrap().unwrap();
        assert_eq!(entry.body, b"new");
        assert_eq!(db.count_entries("app-dynamic-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_match_across_stores_prefers_oldest_store() {
        let db = db_with_stores(&["app-static-v1", "app-dynamic-v1"]).await;
        let id = RequestIdentity::get("https://example.com/logo.png");

        db.put_entry("app-static-v1", &id, &ok_response("static")).await.unwrap();
        db.put_entry("app-dynamic-v1", &id, &ok_response("dynamic")).await.unwrap();

        let entry = db.match_across_stores(&id).await.unwrap().unwrap();
        assert_eq!(entry.store_name, "app-static-v1");
        assert_eq!(entry.body, b"static");
    }

    #[tokio::test]
    async fn test_match_is_method_scoped() {
        let db = db_with_stores(&["s"]).await;
        db.put_entry("s", &RequestIdentity::get("https://example.com/"), &ok_response("x"))
            .await
            .unwrap();

        let head = RequestIdentity::new("HEAD", "https://example.com/");
        assert!(db.match_across_stores(&head).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_by_domain() {
        let db = db_with_stores(&["s"]).await;
        for url in [
            "https://example.com/page1",
            "https://api.example.com/v1",
            "https://other.com/page2",
            "https://notexample.com/",
            "https://other.com/?ref=example.com",
        ] {
            db.put_entry("s", &RequestIdentity::get(url), &ok_response("x")).await.unwrap();
        }

        let deleted = db.purge_entries_by_domain("example.com").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.count_entries("s").await.unwrap(), 3);
        assert!(
            db.match_entry("s", &RequestIdentity::get("https://other.com/?ref=example.com"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_purge_by_domain_is_literal() {
        let db = db_with_stores(&["s"]).await;
        db.put_entry("s", &RequestIdentity::get("https://exampleXcom.net/"), &ok_response("x"))
            .await
            .unwrap();

        assert_eq!(db.purge_entries_by_domain("example_com").await.unwrap(), 0);
        assert_eq!(db.count_entries("s").await.unwrap(), 1);
        assert!(db.purge_entries_by_domain("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_put_never_recreates_deleted_store() {
        let db = db_with_stores(&["app-dynamic-v1"]).await;
        let id = RequestIdentity::get("https://example.com/");
        db.put_entry("app-dynamic-v1", &id, &ok_response("v1")).await.unwrap();
        db.delete_store("app-dynamic-v1").await.unwrap();

        let err = db.put_entry("app-dynamic-v1", &id, &ok_response("late")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(db.store_names().await.unwrap().is_empty());
        assert!(db.match_across_stores(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_lru_keeps_newest() {
        let db = db_with_stores(&["s"]).await;
        for page in ["a", "b", "c"] {
            db.put_entry("s", &RequestIdentity::get(format!("https://example.com/{page}")), &ok_response(page))
                .await
                .unwrap();
        }

        assert_eq!(db.purge_lru_entries("s", 1).await.unwrap(), 2);
        assert_eq!(db.purge_lru_entries("s", 1).await.unwrap(), 0);
        assert!(
            db.match_entry("s", &RequestIdentity::get("https://example.com/c"))
                .await
                .unwrap()
                .is_some()
        );
    }
}
