//! cache_stores tool implementation.
//!
//! Lists stores in creation order with their entry counts and the current
//! storage estimate.

use crate::tools::json_result;
use offcache_client::Registration;
use offcache_core::{AppConfig, CacheDb, StorageEstimate};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_stores tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheStoresParams {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreInfo {
    pub name: String,
    pub entries: u64,
    /// Whether the store belongs to the configured worker version.
    pub current: bool,
}

/// Output from the cache_stores tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStoresOutput {
    pub stores: Vec<StoreInfo>,
    pub estimate: StorageEstimate,
}

/// Implementation of the cache_stores tool.
pub async fn stores_impl(
    registration: &Registration, cache: &CacheDb, config: &AppConfig, _params: CacheStoresParams,
) -> Result<CallToolResult, McpError> {
    let current = [config.static_store_name(), config.dynamic_store_name()];

    let mut stores = Vec::new();
    for name in cache.store_names().await? {
        let entries = cache.count_entries(&name).await?;
        let is_current = current.contains(&name);
        stores.push(StoreInfo { name, entries, current: is_current });
    }

    let estimate = registration.storage_estimate().await?;
    json_result(&CacheStoresOutput { stores, estimate })
}
