//! Durable queue of mutations awaiting background sync.
//!
//! Every operation touches a single row, so an enqueue racing a replay can
//! never lose an item. Items carry no expiry and no retry counter: an item
//! that keeps failing stays queued until a replay succeeds.

use super::connection::CacheDb;
use super::entries::now_timestamp;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A queued write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PendingWrite {
    pub id: i64,
    pub tag: String,
    pub payload: serde_json::Value,
    pub enqueued_at: String,
}

impl CacheDb {
    /// Append a payload under `tag`. Returns the new item id.
    pub async fn enqueue_write(&self, tag: &str, payload: &serde_json::Value) -> Result<i64, Error> {
        let tag = tag.to_string();
        let payload_json = serde_json::to_string(payload)?;
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO pending_writes (tag, payload_json, enqueued_at) VALUES (?1, ?2, ?3)",
                    params![tag, payload_json, now_timestamp()],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Items queued under `tag`, oldest first.
    pub async fn pending_writes(&self, tag: &str) -> Result<Vec<PendingWrite>, Error> {
        let tag = tag.to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<(i64, String, String, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, tag, payload_json, enqueued_at FROM pending_writes WHERE tag = ?1 ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(params![tag], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(id, tag, payload_json, enqueued_at)| -> Result<PendingWrite, Error> {
                Ok(PendingWrite { id, tag, payload: serde_json::from_str(&payload_json)?, enqueued_at })
            })
            .collect()
    }

    /// Remove one item after a successful replay. Returns whether it existed.
    pub async fn remove_pending_write(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let n = conn.execute("DELETE FROM pending_writes WHERE id = ?1", params![id])?;
                Ok(n > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn count_pending_writes(&self, tag: &str) -> Result<u64, Error> {
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let n: i64 =
                    conn.query_row("SELECT COUNT(*) FROM pending_writes WHERE tag = ?1", params![tag], |row| {
                        row.get(0)
                    })?;
                Ok(n as u64)
            })
            .await
            .map_err(Error::from)
    }
}
