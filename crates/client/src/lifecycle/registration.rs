//! Registration of worker versions against an origin.
//!
//! A registration owns at most one controlling worker. Registering a new
//! version installs it, activates it at once (no waiting for clients to go
//! away) and makes it the controller; the previous controller becomes
//! redundant. A version that fails to install never replaces a working one.

use super::{EventOutcome, ServiceWorker, WorkerEvent};
use crate::fetch::{FetchRequest, Network, canonicalize};
use crate::response::{ProxyRequest, ProxyResponse};
use crate::sync::ReplayReport;
use offcache_core::{AppConfig, CacheDb, Error, StorageEstimate};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type WorkerCallback = Box<dyn Fn(&ServiceWorker) + Send + Sync>;
type ReadyCallback = Box<dyn Fn() + Send + Sync>;

/// Hooks fired after a worker version installs.
#[derive(Default)]
pub struct RegistrationCallbacks {
    on_success: Option<WorkerCallback>,
    on_update: Option<WorkerCallback>,
    on_offline_ready: Option<ReadyCallback>,
}

impl RegistrationCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// First version installed; content is cached for offline use.
    pub fn on_success(mut self, f: impl Fn(&ServiceWorker) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// A newer version installed while another one was in control.
    pub fn on_update(mut self, f: impl Fn(&ServiceWorker) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    pub fn on_offline_ready(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_offline_ready = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for RegistrationCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_offline_ready", &self.on_offline_ready.is_some())
            .finish()
    }
}

pub struct Registration {
    scope: Url,
    db: CacheDb,
    network: Arc<dyn Network>,
    storage_quota_bytes: u64,
    controller: RwLock<Option<Arc<ServiceWorker>>>,
    activation: Mutex<()>,
    callbacks: RegistrationCallbacks,
}

impl Registration {
    /// Create an empty registration for `config.origin`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` unless the origin is an http(s) URL.
    pub fn new(
        config: &AppConfig, db: CacheDb, network: Arc<dyn Network>, callbacks: RegistrationCallbacks,
    ) -> Result<Self, Error> {
        let scope = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        if !matches!(scope.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!("registration scope must be http(s): {scope}")));
        }

        Ok(Self {
            scope,
            db,
            network,
            storage_quota_bytes: config.storage_quota_bytes,
            controller: RwLock::new(None),
            activation: Mutex::new(()),
            callbacks,
        })
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// The worker currently controlling requests, if any.
    pub async fn controller(&self) -> Option<Arc<ServiceWorker>> {
        self.controller.read().await.clone()
    }

    /// Build a worker for `config` on this registration's database and network.
    pub fn worker(&self, config: &AppConfig) -> Result<ServiceWorker, Error> {
        ServiceWorker::new(config, self.db.clone(), self.network.clone())
    }

    /// Install, activate and claim `worker`.
    ///
    /// On install failure the worker is left redundant and the previous
    /// controller, if any, keeps serving.
    pub async fn register(&self, worker: ServiceWorker) -> Result<Arc<ServiceWorker>, Error> {
        let _activation = self.activation.lock().await;
        let worker = Arc::new(worker);

        if let Err(e) = worker.handle(WorkerEvent::Install).await {
            tracing::error!(scope = %self.scope, version = worker.version(), error = %e, "worker registration failed");
            return Err(e);
        }

        if self.controller.read().await.is_some() {
            tracing::info!(version = worker.version(), "new content is available");
            if let Some(on_update) = &self.callbacks.on_update {
                on_update(&worker);
            }
        } else {
            tracing::info!(version = worker.version(), "content is cached for offline use");
            if let Some(on_success) = &self.callbacks.on_success {
                on_success(&worker);
            }
            if let Some(on_offline_ready) = &self.callbacks.on_offline_ready {
                on_offline_ready();
            }
        }

        let outgoing = self.controller().await;
        if let Some(outgoing) = &outgoing {
            outgoing.wait_until_settled().await;
        }

        worker.handle(WorkerEvent::Activate).await?;

        let previous = self.controller.write().await.replace(worker.clone());
        if let Some(previous) = previous {
            previous.wait_until_settled().await;
            previous.mark_redundant();
        }

        tracing::info!(scope = %self.scope, version = worker.version(), "worker controls registration");
        Ok(worker)
    }

    /// Register a newer version built from `config`.
    pub async fn update(&self, config: &AppConfig) -> Result<Arc<ServiceWorker>, Error> {
        let worker = self.worker(config)?;
        self.register(worker).await
    }

    /// Send a request through the controller, or straight to the network
    /// when nothing controls the registration.
    pub async fn fetch(&self, request: ProxyRequest) -> ProxyResponse {
        let controller = self.controller().await;
        if let Some(worker) = controller
            && worker.state().can_intercept_fetch()
        {
            return match worker.handle(WorkerEvent::Fetch(request)).await {
                Ok(EventOutcome::Response(response)) => response,
                Ok(other) => {
                    tracing::error!(outcome = ?other, "unexpected fetch outcome");
                    ProxyResponse::internal_error()
                }
                Err(e) => {
                    tracing::error!(error = %e, "controller failed to handle fetch");
                    ProxyResponse::internal_error()
                }
            };
        }

        self.uncontrolled_fetch(request).await
    }

    async fn uncontrolled_fetch(&self, request: ProxyRequest) -> ProxyResponse {
        let url = match canonicalize(&request.url, &self.scope) {
            Ok(url) => url,
            Err(e) => return ProxyResponse::synthetic(400, &Error::InvalidUrl(e.to_string()).to_string()),
        };
        let fetch_request = FetchRequest { method: request.method, url, headers: request.headers, body: request.body };
        match self.network.fetch(&fetch_request).await {
            Ok(response) => ProxyResponse::from_network(&response),
            Err(e) => {
                tracing::warn!(url = %fetch_request.url, error = %e, "uncontrolled fetch failed");
                ProxyResponse::network_error()
            }
        }
    }

    /// Deliver a sync event for `tag` to the controller.
    pub async fn sync(&self, tag: &str) -> Result<Option<ReplayReport>, Error> {
        let worker = self
            .controller()
            .await
            .ok_or_else(|| Error::InvalidState("no active worker to deliver sync to".into()))?;

        match worker.handle(WorkerEvent::Sync { tag: tag.to_string() }).await? {
            EventOutcome::Synced(report) => Ok(report),
            other => Err(Error::InvalidState(format!("unexpected sync outcome: {other:?}"))),
        }
    }

    /// Store `payload` under `tag` and fire the sync right away.
    ///
    /// The payload stays queued when the sync cannot run (no controller) or
    /// when the replay fails; a later sync picks it up.
    pub async fn enqueue_for_sync(&self, tag: &str, payload: &serde_json::Value) -> Result<i64, Error> {
        let id = self.db.enqueue_write(tag, payload).await?;
        tracing::debug!(tag, id, "registered background sync");

        if let Err(e) = self.sync(tag).await {
            tracing::warn!(tag, error = %e, "background sync deferred");
        }
        Ok(id)
    }

    /// Stop interception. Returns whether a worker was in control.
    pub async fn unregister(&self) -> bool {
        let _activation = self.activation.lock().await;
        match self.controller.write().await.take() {
            Some(worker) => {
                worker.wait_until_settled().await;
                worker.mark_redundant();
                tracing::info!(scope = %self.scope, version = worker.version(), "unregistered");
                true
            }
            None => false,
        }
    }

    /// Delete every cache store. Returns how many were removed.
    pub async fn clear_all_caches(&self) -> Result<u64, Error> {
        let cleared = self.db.clear_all_stores().await?;
        tracing::info!(cleared, "all caches cleared");
        Ok(cleared)
    }

    pub async fn storage_estimate(&self) -> Result<StorageEstimate, Error> {
        self.db.storage_estimate(self.storage_quota_bytes).await
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("scope", &self.scope.as_str())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}
