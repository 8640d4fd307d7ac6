//! Background sync tools: queue_enqueue, queue_list and sync_replay.

use crate::error::ToolError;
use crate::tools::json_result;
use offcache_client::Registration;
use offcache_core::{AppConfig, CacheDb, PendingWrite};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the queue_enqueue tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueEnqueueParams {
    /// JSON payload to POST to the sync endpoint once online.
    pub payload: serde_json::Value,

    /// Sync tag (default: the configured tag, `booking-sync`).
    #[serde(default)]
    pub tag: Option<String>,
}

/// Output from the queue_enqueue tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueEnqueueOutput {
    pub id: i64,
    pub tag: String,
    /// Items still pending for the tag after the immediate sync attempt.
    pub pending: u64,
}

/// Parameters for the queue_list tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueueListParams {
    /// Sync tag (default: the configured tag).
    #[serde(default)]
    pub tag: Option<String>,
}

/// Output from the queue_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueListOutput {
    pub tag: String,
    pub items: Vec<PendingWrite>,
}

/// Parameters for the sync_replay tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyncReplayParams {
    /// Sync tag to fire (default: the configured tag).
    #[serde(default)]
    pub tag: Option<String>,
}

/// Output from the sync_replay tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncReplayOutput {
    pub tag: String,
    /// False when the worker does not replay this tag.
    pub handled: bool,
    pub attempted: usize,
    pub replayed: usize,
    pub failed: usize,
    pub remaining: u64,
}

fn resolve_tag(tag: Option<String>, config: &AppConfig) -> Result<String, ToolError> {
    match tag {
        Some(tag) if tag.trim().is_empty() => Err(ToolError::InvalidInput("tag cannot be empty".into())),
        Some(tag) => Ok(tag),
        None => Ok(config.sync_tag.clone()),
    }
}

/// Implementation of the queue_enqueue tool.
pub async fn enqueue_impl(
    registration: &Registration, db: &CacheDb, config: &AppConfig, params: QueueEnqueueParams,
) -> Result<CallToolResult, McpError> {
    let tag = resolve_tag(params.tag, config)?;
    if params.payload.is_null() {
        return Err(ToolError::InvalidInput("payload cannot be null".into()).into());
    }

    let id = registration.enqueue_for_sync(&tag, &params.payload).await?;
    let pending = db.count_pending_writes(&tag).await?;

    json_result(&QueueEnqueueOutput { id, tag, pending })
}

/// Implementation of the queue_list tool.
pub async fn list_impl(db: &CacheDb, config: &AppConfig, params: QueueListParams) -> Result<CallToolResult, McpError> {
    let tag = resolve_tag(params.tag, config)?;
    let items = db.pending_writes(&tag).await?;

    json_result(&QueueListOutput { tag, items })
}

/// Implementation of the sync_replay tool.
pub async fn replay_impl(
    registration: &Registration, config: &AppConfig, params: SyncReplayParams,
) -> Result<CallToolResult, McpError> {
    let tag = resolve_tag(params.tag, config)?;

    let output = match registration.sync(&tag).await? {
        Some(report) => SyncReplayOutput {
            tag,
            handled: true,
            attempted: report.attempted,
            replayed: report.replayed,
            failed: report.failed,
            remaining: report.remaining,
        },
        None => SyncReplayOutput { tag, handled: false, attempted: 0, replayed: 0, failed: 0, remaining: 0 },
    };

    json_result(&output)
}
