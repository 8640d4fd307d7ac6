//! The fetch boundary.
//!
//! [`CacheProxy`] owns the classifier, the strategy context and the offline
//! queue for one worker version. `handle_fetch` never fails: every request
//! ends as a [`ProxyResponse`], with internal errors logged and turned into a
//! synthetic 500.

use crate::classify::{BypassReason, Classification, Classifier};
use crate::fetch::{self, FetchRequest, Network, UrlError};
use crate::response::{ProxyRequest, ProxyResponse};
use crate::strategy::{self, StoreNames, StrategyContext};
use crate::sync::OfflineQueue;
use crate::tasks::PendingWork;
use offcache_core::{AppConfig, CacheDb, Error, RequestIdentity};
use reqwest::{Method, Url};
use std::sync::Arc;

pub struct CacheProxy {
    ctx: StrategyContext,
    classifier: Classifier,
    origin: Url,
    queue: OfflineQueue,
    sync_tag: String,
    queued_write_paths: Vec<String>,
}

impl CacheProxy {
    /// Build the proxy for the worker version described by `config`.
    pub fn from_config(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        let endpoint = fetch::canonicalize(&config.sync_endpoint, &origin).map_err(url_error)?;
        let classifier = Classifier::from_config(config)?;
        let queue = OfflineQueue::new(db.clone(), network.clone(), endpoint);
        let ctx = StrategyContext::new(db, network, StoreNames::from_config(config));

        Ok(Self {
            ctx,
            classifier,
            origin,
            queue,
            sync_tag: config.sync_tag.clone(),
            queued_write_paths: config.queued_write_paths.clone(),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn stores(&self) -> &StoreNames {
        &self.ctx.stores
    }

    pub fn db(&self) -> &CacheDb {
        &self.ctx.db
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.ctx.network
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn sync_tag(&self) -> &str {
        &self.sync_tag
    }

    /// Background work started while handling requests.
    pub fn pending(&self) -> &PendingWork {
        &self.ctx.pending
    }

    /// Create this generation's static and dynamic stores.
    pub async fn open_stores(&self) -> Result<(), Error> {
        self.ctx.open_stores().await
    }

    /// Wait until every background revalidation has finished.
    pub async fn wait_until_settled(&self) {
        self.ctx.pending.settle().await;
    }

    /// Resolve one intercepted request.
    pub async fn handle_fetch(&self, request: ProxyRequest) -> ProxyResponse {
        let url = match fetch::resolve(&request.url, &self.origin) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "rejecting unparseable request URL");
                return ProxyResponse::synthetic(400, &url_error(e).to_string());
            }
        };

        let classification = if matches!(url.scheme(), "http" | "https") && !fetch::is_same_origin(&url, &self.origin) {
            Classification::Bypass(BypassReason::CrossOrigin)
        } else {
            self.classifier.classify(&request.method, &url)
        };

        let outcome = match classification {
            Classification::Bypass(reason) => {
                tracing::debug!(method = %request.method, %url, ?reason, "bypassing cache");
                self.passthrough(request, url).await
            }
            Classification::Class(class) => {
                let strategy = strategy::route(class);
                let identity = RequestIdentity::get(url.as_str());
                tracing::debug!(%identity, ?class, strategy = strategy.as_str(), "intercepted");
                let fetch_request = FetchRequest { method: Method::GET, url, headers: request.headers, body: None };
                self.ctx.execute(strategy, &identity, fetch_request).await
            }
        };

        outcome.unwrap_or_else(|e| {
            tracing::error!(error = %e, "worker failed while handling fetch");
            ProxyResponse::internal_error()
        })
    }

    /// Send an uncached request straight to the network.
    ///
    /// A failed same-origin POST to one of the queued write paths is stored
    /// for background sync and answered with 202.
    async fn passthrough(&self, request: ProxyRequest, url: Url) -> Result<ProxyResponse, Error> {
        let fetch_request = FetchRequest { method: request.method, url, headers: request.headers, body: request.body };

        let error = match self.ctx.network.fetch(&fetch_request).await {
            Ok(response) => return Ok(ProxyResponse::from_network(&response)),
            Err(e) => e,
        };

        if let Some(payload) = self.queueable_payload(&fetch_request) {
            tracing::warn!(url = %fetch_request.url, error = %error, "write failed offline, queueing");
            self.queue.enqueue(&self.sync_tag, &payload).await?;
            return Ok(ProxyResponse::queued());
        }

        tracing::warn!(
            method = %fetch_request.method, url = %fetch_request.url, error = %error,
            "passthrough request failed"
        );
        Ok(ProxyResponse::network_error())
    }

    fn queueable_payload(&self, request: &FetchRequest) -> Option<serde_json::Value> {
        if request.method != Method::POST || !fetch::is_same_origin(&request.url, &self.origin) {
            return None;
        }
        if !self.queued_write_paths.iter().any(|p| request.url.path() == p) {
            return None;
        }
        let body = request.body.as_ref()?;
        match serde_json::from_slice(body) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "write body is not JSON, not queueing");
                None
            }
        }
    }
}

fn url_error(e: UrlError) -> Error {
    Error::InvalidUrl(e.to_string())
}

impl std::fmt::Debug for CacheProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheProxy")
            .field("origin", &self.origin.as_str())
            .field("stores", &self.ctx.stores)
            .field("sync_tag", &self.sync_tag)
            .finish_non_exhaustive()
    }
}
