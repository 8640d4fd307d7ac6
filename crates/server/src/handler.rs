//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::{
    CacheGetParams, CachePurgeParams, CacheStoresParams, ProxyFetchParams, QueueEnqueueParams, QueueListParams,
    SyncReplayParams, WorkerStatusParams, enqueue_impl, get_impl, list_impl, proxy_fetch_impl, purge_impl, replay_impl,
    status_impl, stores_impl,
};

use offcache_client::Registration;
use offcache_core::{AppConfig, CacheDb};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use std::sync::Arc;

/// The main MCP server handler for offcache.
#[derive(Clone)]
pub struct OffcacheServer {
    tool_router: ToolRouter<Self>,
    registration: Arc<Registration>,
    db: CacheDb,
    config: Arc<AppConfig>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OffcacheServer {
    /// Create a new server handler.
    pub fn new(registration: Arc<Registration>, db: CacheDb, config: Arc<AppConfig>) -> Self {
        Self { tool_router: Self::tool_router(), registration, db, config }
    }

    #[tool(description = "Issue a request through the caching worker. \
        GET requests are answered cache-first, network-first or stale-while-revalidate by class; \
        other methods go to the network.")]
    async fn proxy_fetch(&self, params: Parameters<ProxyFetchParams>) -> Result<CallToolResult, McpError> {
        proxy_fetch_impl(&self.registration, params.0).await
    }

    #[tool(description = "Fire a background sync for a tag, replaying queued writes oldest first.")]
    async fn sync_replay(&self, params: Parameters<SyncReplayParams>) -> Result<CallToolResult, McpError> {
        replay_impl(&self.registration, &self.config, params.0).await
    }

    #[tool(description = "Queue a JSON payload for background sync and try to replay it immediately.")]
    async fn queue_enqueue(&self, params: Parameters<QueueEnqueueParams>) -> Result<CallToolResult, McpError> {
        enqueue_impl(&self.registration, &self.db, &self.config, params.0).await
    }

    #[tool(description = "List writes waiting for background sync.")]
    async fn queue_list(&self, params: Parameters<QueueListParams>) -> Result<CallToolResult, McpError> {
        list_impl(&self.db, &self.config, params.0).await
    }

    #[tool(description = "Look up a captured response by URL, in one store or across all stores.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.db, &self.config, params.0).await
    }

    #[tool(description = "List cache stores with entry counts and the storage estimate.")]
    async fn cache_stores(&self, params: Parameters<CacheStoresParams>) -> Result<CallToolResult, McpError> {
        stores_impl(&self.registration, &self.db, &self.config, params.0).await
    }

    #[tool(description = "Purge cache entries by domain or LRU count, delete a store, or clear all stores.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.registration, &self.db, params.0).await
    }

    #[tool(description = "Report the controlling worker's version, lifecycle state and pending work.")]
    async fn worker_status(&self, params: Parameters<WorkerStatusParams>) -> Result<CallToolResult, McpError> {
        status_impl(&self.registration, &self.db, &self.config, params.0).await
    }
}

impl ServerHandler for OffcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
