//! cache_purge tool implementation.
//!
//! Purges cache entries by domain or count, drops single stores, or clears
//! everything.

use crate::tools::json_result;
use offcache_client::Registration;
use offcache_core::{CacheDb, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Purge entries whose URL matches this domain pattern, in every store.
    pub domain: Option<String>,

    /// Keep only the newest N entries of `store` (LRU purge).
    pub max_entries: Option<usize>,

    /// Store targeted by `max_entries`.
    pub store: Option<String>,

    /// Delete this whole store.
    pub delete_store: Option<String>,

    /// Delete every store.
    #[serde(default)]
    pub clear_all: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted by domain/LRU purges.
    pub deleted: u64,
    /// Number of stores deleted.
    pub deleted_stores: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(
    registration: &Registration, cache: &CacheDb, params: CachePurgeParams,
) -> Result<CallToolResult, McpError> {
    if params.domain.is_none() && params.max_entries.is_none() && params.delete_store.is_none() && !params.clear_all {
        return Err(Error::InvalidInput(
            "At least one of domain, max_entries, delete_store, or clear_all must be specified".to_string(),
        )
        .into());
    }

    if params.max_entries.is_some() && params.store.is_none() {
        return Err(Error::InvalidInput("max_entries requires store".to_string()).into());
    }

    let mut deleted_total = 0u64;
    let mut deleted_stores = 0u64;

    if let Some(domain) = params.domain {
        if domain.trim().is_empty() {
            return Err(Error::InvalidInput("domain cannot be empty".to_string()).into());
        }
        deleted_total += cache.purge_entries_by_domain(&domain).await?;
    }

    if let (Some(max_entries), Some(store)) = (params.max_entries, &params.store) {
        deleted_total += cache.purge_lru_entries(store, max_entries).await?;
    }

    if let Some(store) = params.delete_store
        && cache.delete_store(&store).await?
    {
        deleted_stores += 1;
    }

    if params.clear_all {
        deleted_stores += registration.clear_all_caches().await?;
    }

    let output = CachePurgeOutput { deleted: deleted_total, deleted_stores };
    json_result(&output)
}
