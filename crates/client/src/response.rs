//! Request and response values at the interception boundary.
//!
//! Every intercepted request resolves to a [`ProxyResponse`]; failures are
//! expressed as synthetic HTTP responses rather than errors.

use crate::fetch::FetchResponse;
use bytes::Bytes;
use offcache_core::CachedEntry;
use reqwest::{Method, header};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const NETWORK_ERROR_BODY: &str = "Network error";
pub const NO_CACHE_BODY: &str = "Network error and no cache available";
pub const INTERNAL_ERROR_BODY: &str = "Internal worker error";
pub const QUEUED_BODY: &str = "Queued for background sync";

/// A request issued by the host application.
///
/// `url` may be relative; it is resolved against the registration origin.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: String,
    pub headers: header::HeaderMap,
    pub body: Option<Bytes>,
}

impl ProxyRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: header::HeaderMap::new(), body: None }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_json(url: impl Into<String>, payload: &serde_json::Value) -> Self {
        let mut request = Self::new(Method::POST, url);
        request
            .headers
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        request.body = Some(Bytes::from(payload.to_string()));
        request
    }
}

/// Terminal state of one intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    FromCache,
    FromNetwork,
    Error,
}

/// The response handed back to the host application.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub resolution: Resolution,
    /// Store the response was served from, when resolved from cache.
    pub store_name: Option<String>,
}

impl ProxyResponse {
    pub fn from_entry(entry: CachedEntry) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers,
            body: Bytes::from(entry.body),
            resolution: Resolution::FromCache,
            store_name: Some(entry.store_name),
        }
    }

    pub fn from_network(response: &FetchResponse) -> Self {
        let stored = response.to_stored();
        Self {
            status: stored.status,
            headers: stored.headers,
            body: response.bytes.clone(),
            resolution: Resolution::FromNetwork,
            store_name: None,
        }
    }

    /// A response fabricated by the worker itself.
    pub fn synthetic(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
            body: Bytes::from(message.to_string()),
            resolution: Resolution::Error,
            store_name: None,
        }
    }

    /// 408 returned when the network is unreachable.
    pub fn network_error() -> Self {
        Self::synthetic(408, NETWORK_ERROR_BODY)
    }

    /// 408 returned when the network is unreachable and nothing is cached.
    pub fn offline_without_cache() -> Self {
        Self::synthetic(408, NO_CACHE_BODY)
    }

    /// 500 returned when the worker itself failed.
    pub fn internal_error() -> Self {
        Self::synthetic(500, INTERNAL_ERROR_BODY)
    }

    /// 202 returned when a failed write was queued for background sync.
    pub fn queued() -> Self {
        Self::synthetic(202, QUEUED_BODY)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
