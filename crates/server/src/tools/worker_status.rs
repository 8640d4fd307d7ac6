//! worker_status tool implementation.

use crate::tools::json_result;
use offcache_client::Registration;
use offcache_core::{AppConfig, CacheDb};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the worker_status tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatusParams {}

/// Output from the worker_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatusOutput {
    pub scope: String,
    /// Whether an activated worker intercepts requests.
    pub controlled: bool,
    pub version: Option<String>,
    pub state: Option<String>,
    pub static_store: Option<String>,
    pub dynamic_store: Option<String>,
    /// Background revalidations still running.
    pub background_tasks: usize,
    /// Writes waiting for the configured sync tag.
    pub pending_writes: u64,
}

/// Implementation of the worker_status tool.
pub async fn status_impl(
    registration: &Registration, db: &CacheDb, config: &AppConfig, _params: WorkerStatusParams,
) -> Result<CallToolResult, McpError> {
    let pending_writes = db.count_pending_writes(&config.sync_tag).await?;

    let output = match registration.controller().await {
        Some(worker) => {
            let stores = worker.proxy().stores();
            WorkerStatusOutput {
                scope: registration.scope().to_string(),
                controlled: worker.state().can_intercept_fetch(),
                version: Some(worker.version().to_string()),
                state: Some(worker.state().to_string()),
                static_store: Some(stores.static_store.clone()),
                dynamic_store: Some(stores.dynamic_store.clone()),
                background_tasks: worker.proxy().pending().len(),
                pending_writes,
            }
        }
        None => WorkerStatusOutput {
            scope: registration.scope().to_string(),
            controlled: false,
            version: None,
            state: None,
            static_store: None,
            dynamic_store: None,
            background_tasks: 0,
            pending_writes,
        },
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{EchoNetwork, controlled, output, registration};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_controlled() {
        let (registration, db, config) = controlled(Arc::new(EchoNetwork::default())).await;

        let out: WorkerStatusOutput =
            output(&status_impl(&registration, &db, &config, WorkerStatusParams::default()).await.unwrap());
        assert!(out.controlled);
        assert_eq!(out.version.as_deref(), Some("v1"));
        assert_eq!(out.state.as_deref(), Some("activated"));
        assert_eq!(out.static_store.as_deref(), Some("bookataxi-static-v1"));
        assert_eq!(out.pending_writes, 0);
    }

    #[tokio::test]
    async fn test_status_uncontrolled() {
        let (registration, db, config) = registration(Arc::new(EchoNetwork::default())).await;

        let out: WorkerStatusOutput =
            output(&status_impl(&registration, &db, &config, WorkerStatusParams::default()).await.unwrap());
        assert!(!out.controlled);
        assert!(out.version.is_none());
        assert_eq!(out.scope, "http://localhost:3000/");
    }
}
