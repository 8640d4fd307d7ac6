//! proxy_fetch tool implementation.
//!
//! Issues one request through the registration, exactly as an intercepted
//! page request would be handled.

use crate::error::ToolError;
use crate::tools::json_result;
use offcache_client::{Method, ProxyRequest, Registration, Resolution};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input parameters for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchParams {
    /// Request URL, absolute or relative to the registration origin.
    pub url: String,

    /// HTTP method (default: GET). Only GET requests are cached.
    #[serde(default = "default_method")]
    pub method: String,

    /// JSON body sent with non-GET requests.
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Wait for background revalidation to finish before returning.
    #[serde(default)]
    pub wait_until_settled: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchOutput {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub resolution: Resolution,
    /// Store that served the response, if it came from cache.
    pub store_name: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
}

/// Implementation of the proxy_fetch tool.
pub async fn proxy_fetch_impl(
    registration: &Registration, params: ProxyFetchParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let method = Method::from_bytes(params.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ToolError::InvalidInput(format!("invalid method: {}", params.method)))?;

    let request = match &params.body {
        Some(_) if method == Method::GET || method == Method::HEAD => {
            return Err(ToolError::InvalidInput(format!("{method} requests cannot carry a body")).into());
        }
        Some(body) => {
            let mut request = ProxyRequest::post_json(params.url.clone(), body);
            request.method = method.clone();
            request
        }
        None => ProxyRequest::new(method.clone(), params.url.clone()),
    };

    let response = registration.fetch(request).await;

    if params.wait_until_settled
        && let Some(worker) = registration.controller().await
    {
        worker.wait_until_settled().await;
    }

    let body = response.text();
    let output = ProxyFetchOutput {
        url: params.url,
        method: method.to_string(),
        status: response.status,
        resolution: response.resolution,
        store_name: response.store_name,
        headers: response.headers,
        body,
        body_bytes: response.body.len(),
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{EchoNetwork, controlled, output, registration};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn params(url: &str) -> ProxyFetchParams {
        ProxyFetchParams { url: url.into(), method: default_method(), body: None, wait_until_settled: true }
    }

    #[tokio::test]
    async fn test_static_asset_served_from_cache_when_offline() {
        let network = Arc::new(EchoNetwork::default());
        let (registration, _, _) = controlled(network.clone()).await;
        network.offline.store(true, Ordering::SeqCst);

        let result = proxy_fetch_impl(&registration, params("/static/js/bundle.js")).await.unwrap();
        let out: ProxyFetchOutput = output(&result);
        assert_eq!(out.status, 200);
        assert_eq!(out.resolution, Resolution::FromCache);
        assert_eq!(out.store_name.as_deref(), Some("bookataxi-static-v1"));
        assert_eq!(out.body, "ok /static/js/bundle.js");
    }

    #[tokio::test]
    async fn test_uncontrolled_request_goes_to_network() {
        let network = Arc::new(EchoNetwork::default());
        let (registration, _, _) = registration(network).await;

        let result = proxy_fetch_impl(&registration, params("/api/services")).await.unwrap();
        let out: ProxyFetchOutput = output(&result);
        assert_eq!(out.resolution, Resolution::FromNetwork);

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["resolution"], "from_network");
        assert_eq!(out.method, "GET");
    }

    #[tokio::test]
    async fn test_offline_booking_is_queued() {
        let network = Arc::new(EchoNetwork::default());
        let (registration, db, _) = controlled(network.clone()).await;
        network.offline.store(true, Ordering::SeqCst);

        let mut p = params("/api/bookings");
        p.method = "post".into();
        p.body = Some(serde_json::json!({"pickup": "Airport"}));

        let out: ProxyFetchOutput = output(&proxy_fetch_impl(&registration, p).await.unwrap());
        assert_eq!(out.status, 202);
        assert_eq!(db.count_pending_writes("booking-sync").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let (registration, _, _) = registration(Arc::new(EchoNetwork::default())).await;

        assert!(proxy_fetch_impl(&registration, params("")).await.is_err());

        let mut p = params("/");
        p.method = "NOT A METHOD".into();
        assert!(proxy_fetch_impl(&registration, p).await.is_err());

        let mut p = params("/");
        p.body = Some(serde_json::json!({}));
        assert!(proxy_fetch_impl(&registration, p).await.is_err());
    }
}
