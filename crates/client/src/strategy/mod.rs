//! Caching strategies and the class-to-strategy table.
//!
//! Each executor resolves one request to a [`ProxyResponse`]. Network
//! failures are turned into synthetic responses inside the executor; an
//! `Err` only escapes for storage failures on the lookup path, which the
//! proxy converts into a synthetic 500.

pub mod cache_first;
pub mod network_first;
pub mod stale_while_revalidate;

use crate::classify::RequestClass;
use crate::fetch::{FetchRequest, FetchResponse, Network};
use crate::response::ProxyResponse;
use crate::tasks::PendingWork;
use offcache_core::{AppConfig, CacheDb, CacheStore, Error, RequestIdentity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a classified request is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache_first",
            Strategy::NetworkFirst => "network_first",
            Strategy::StaleWhileRevalidate => "stale_while_revalidate",
        }
    }
}

/// The one mapping from request class to strategy.
pub fn route(class: RequestClass) -> Strategy {
    match class {
        RequestClass::StaticAsset => Strategy::CacheFirst,
        RequestClass::ApiCall => Strategy::NetworkFirst,
        RequestClass::Image => Strategy::CacheFirst,
        RequestClass::Document => Strategy::StaleWhileRevalidate,
    }
}

/// Names of the two stores owned by the running worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNames {
    pub static_store: String,
    pub dynamic_store: String,
}

impl StoreNames {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { static_store: config.static_store_name(), dynamic_store: config.dynamic_store_name() }
    }
}

/// Everything an executor needs, passed explicitly to every handler.
///
/// The store handles never create their store: once a newer generation has
/// deleted it, captures through them fail instead of bringing it back.
#[derive(Clone)]
pub struct StrategyContext {
    pub db: CacheDb,
    pub network: Arc<dyn Network>,
    pub stores: StoreNames,
    pub static_store: CacheStore,
    pub dynamic_store: CacheStore,
    pub pending: PendingWork,
}

impl StrategyContext {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, stores: StoreNames) -> Self {
        let static_store = db.store(&stores.static_store);
        let dynamic_store = db.store(&stores.dynamic_store);
        Self { db, network, stores, static_store, dynamic_store, pending: PendingWork::new() }
    }

    /// Create both stores of this generation, static first.
    pub async fn open_stores(&self) -> Result<(), Error> {
        self.db.open_store(&self.stores.static_store).await?;
        self.db.open_store(&self.stores.dynamic_store).await?;
        Ok(())
    }

    /// Run `strategy` for a GET request.
    pub async fn execute(
        &self, strategy: Strategy, identity: &RequestIdentity, request: FetchRequest,
    ) -> Result<ProxyResponse, Error> {
        match strategy {
            Strategy::CacheFirst => cache_first::execute(self, identity, request).await,
            Strategy::NetworkFirst => network_first::execute(self, identity, request).await,
            Strategy::StaleWhileRevalidate => stale_while_revalidate::execute(self, identity, request).await,
        }
    }

    /// Store a network response. Failures, including a store deleted by a
    /// newer generation, are logged and swallowed.
    pub(crate) async fn capture(
        &self, store: &CacheStore, identity: &RequestIdentity, response: &FetchResponse,
    ) -> bool {
        match store.put(identity, &response.to_stored()).await {
            Ok(stored) => {
                if stored {
                    tracing::debug!(store = store.name(), %identity, "captured response");
                }
                stored
            }
            Err(e) => {
                tracing::warn!(store = store.name(), %identity, error = %e, "failed to capture response");
                false
            }
        }
    }
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("stores", &self.stores)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
