//! MCP tool implementations.
//!
//! This module contains all tools exposed by the offcache server.

pub mod cache;
pub mod proxy_fetch;
pub mod sync;
pub mod worker_status;

pub use cache::{CacheGetParams, CachePurgeParams, CacheStoresParams, get_impl, purge_impl, stores_impl};
pub use proxy_fetch::{ProxyFetchParams, proxy_fetch_impl};
pub use sync::{QueueEnqueueParams, QueueListParams, SyncReplayParams, enqueue_impl, list_impl, replay_impl};
pub use worker_status::{WorkerStatusParams, status_impl};

use crate::error::ToolError;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Encode a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Serialization(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
