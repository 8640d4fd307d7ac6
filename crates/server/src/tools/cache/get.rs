//! cache_get tool implementation.
//!
//! Retrieves a captured response by request URL.

use crate::tools::json_result;
use offcache_client::fetch::canonicalize;
use offcache_core::{AppConfig, CacheDb, Error, RequestIdentity};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Request URL, absolute or relative to the registration origin.
    pub url: String,

    /// Restrict the lookup to one store. Searches every store, oldest
    /// first, when omitted.
    #[serde(default)]
    pub store: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub store_name: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
    pub captured_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheDb, config: &AppConfig, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let url = canonicalize(&params.url, &origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let identity = RequestIdentity::get(url.as_str());

    let entry = match &params.store {
        Some(store) => cache.match_entry(store, &identity).await?,
        None => cache.match_across_stores(&identity).await?,
    }
    .ok_or_else(|| Error::CacheMiss(identity.to_string()))?;

    let output = CacheGetOutput {
        body: String::from_utf8_lossy(&entry.body).into_owned(),
        body_bytes: entry.body.len(),
        store_name: entry.store_name,
        method: entry.method,
        url: entry.url,
        status: entry.status,
        headers: entry.headers,
        captured_at: entry.captured_at,
    };

    json_result(&output)
}
