//! Worker lifecycle.
//!
//! A [`ServiceWorker`] is one version of the caching proxy. It moves through
//! `Parsed -> Installing -> Installed -> Activating -> Activated` as typed
//! events are delivered, or ends `Redundant` when install fails or a newer
//! version takes over. Only an activated worker handles fetch and sync.

pub mod registration;

use crate::fetch::{self, FetchRequest, Network};
use crate::proxy::CacheProxy;
use crate::response::{ProxyRequest, ProxyResponse};
use crate::sync::ReplayReport;
use futures_util::future::try_join_all;
use offcache_core::{AppConfig, CacheDb, Error, RequestIdentity, StoredResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

pub use registration::{Registration, RegistrationCallbacks};

/// Lifecycle states of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Created, nothing cached yet
    Parsed,
    /// Fetching the static manifest
    Installing,
    /// Manifest cached
    Installed,
    /// Purging stale stores
    Activating,
    /// Controlling requests
    Activated,
    /// Failed install, superseded or unregistered
    Redundant,
}

impl WorkerState {
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Redundant)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Events delivered to a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(ProxyRequest),
    Sync { tag: String },
}

/// What handling an event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed { cached: usize },
    Activated { purged: Vec<String> },
    Response(ProxyResponse),
    /// `None` when the tag is not one this worker replays.
    Synced(Option<ReplayReport>),
}

/// One version of the caching proxy.
pub struct ServiceWorker {
    version: String,
    manifest: Vec<String>,
    proxy: CacheProxy,
    state: watch::Sender<WorkerState>,
}

impl ServiceWorker {
    pub fn new(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let proxy = CacheProxy::from_config(config, db, network)?;
        let (state, _) = watch::channel(WorkerState::Parsed);
        Ok(Self { version: config.cache_version.clone(), manifest: config.static_manifest.clone(), proxy, state })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn proxy(&self) -> &CacheProxy {
        &self.proxy
    }

    /// Wait for background work started by earlier events.
    pub async fn wait_until_settled(&self) {
        self.proxy.wait_until_settled().await;
    }

    pub fn mark_redundant(&self) {
        let previous = self.state.send_replace(WorkerState::Redundant);
        if previous != WorkerState::Redundant {
            tracing::info!(version = %self.version, from = %previous, "worker is redundant");
        }
    }

    /// Deliver one event and return once it is handled.
    ///
    /// Background work started by the event keeps running; await
    /// [`ServiceWorker::wait_until_settled`] to extend past it.
    pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome, Error> {
        match event {
            WorkerEvent::Install => self.install().await.map(|cached| EventOutcome::Installed { cached }),
            WorkerEvent::Activate => self.activate().await.map(|purged| EventOutcome::Activated { purged }),
            WorkerEvent::Fetch(request) => {
                self.require_active("fetch")?;
                Ok(EventOutcome::Response(self.proxy.handle_fetch(request).await))
            }
            WorkerEvent::Sync { tag } => {
                self.require_active("sync")?;
                self.sync(&tag).await.map(EventOutcome::Synced)
            }
        }
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                result = Err(Error::InvalidState(format!("cannot move worker {} from {state} to {to}", self.version)));
                false
            }
        });
        if result.is_ok() {
            tracing::info!(version = %self.version, %from, %to, "worker state changed");
        }
        result
    }

    fn require_active(&self, what: &str) -> Result<(), Error> {
        let state = self.state();
        if state.can_intercept_fetch() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("worker {} cannot handle {what} while {state}", self.version)))
        }
    }

    /// Cache every manifest path into the static store, all or nothing.
    async fn install(&self) -> Result<usize, Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;

        match self.precache().await {
            Ok(cached) => {
                self.transition(WorkerState::Installing, WorkerState::Installed)?;
                Ok(cached)
            }
            Err(e) => {
                tracing::error!(version = %self.version, error = %e, "failed to cache static assets");
                self.mark_redundant();
                Err(match e {
                    Error::InstallFailed(_) => e,
                    other => Error::InstallFailed(other.to_string()),
                })
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let origin = self.proxy.origin();
        let network = self.proxy.network();

        let entries =
            try_join_all(self.manifest.iter().map(|path| fetch_manifest_entry(network.as_ref(), origin, path))).await?;

        let store = self.proxy.db().store(&self.proxy.stores().static_store);
        let cached = store.populate(entries).await?;
        self.proxy.open_stores().await?;
        tracing::info!(version = %self.version, store = store.name(), cached, "static assets cached");
        Ok(cached)
    }

    /// Drop every store this version does not own.
    async fn activate(&self) -> Result<Vec<String>, Error> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;

        let stores = self.proxy.stores();
        let keep = [stores.static_store.as_str(), stores.dynamic_store.as_str()];
        match self.proxy.db().delete_stores_not_in(&keep).await {
            Ok(purged) => {
                for name in &purged {
                    tracing::info!(store = %name, "deleted old cache store");
                }
                self.transition(WorkerState::Activating, WorkerState::Activated)?;
                Ok(purged)
            }
            Err(e) => {
                tracing::error!(version = %self.version, error = %e, "activation failed");
                self.mark_redundant();
                Err(e)
            }
        }
    }

    async fn sync(&self, tag: &str) -> Result<Option<ReplayReport>, Error> {
        if tag != self.proxy.sync_tag() {
            tracing::debug!(tag, "ignoring sync for unknown tag");
            return Ok(None);
        }
        self.proxy.queue().replay_all(tag).await.map(Some)
    }

    /// Shorthand for delivering a fetch event.
    pub async fn fetch(&self, request: ProxyRequest) -> Result<ProxyResponse, Error> {
        match self.handle(WorkerEvent::Fetch(request)).await? {
            EventOutcome::Response(response) => Ok(response),
            other => Err(Error::InvalidState(format!("unexpected fetch outcome: {other:?}"))),
        }
    }
}

async fn fetch_manifest_entry(
    network: &dyn Network, origin: &reqwest::Url, path: &str,
) -> Result<(RequestIdentity, StoredResponse), Error> {
    let url = fetch::canonicalize(path, origin).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
    let response = network.fetch(&FetchRequest::get(url.clone())).await?;
    if !response.status.is_success() {
        return Err(Error::InstallFailed(format!("{url} returned {}", response.status.as_u16())));
    }
    Ok((RequestIdentity::get(url.as_str()), response.to_stored()))
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("version", &self.version)
            .field("state", &self.state())
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Resolution;
    use crate::testing::ScriptedNetwork;
    use serde_json::json;

    const ORIGIN: &str = "http://localhost:3000";

    fn serve_manifest(network: &ScriptedNetwork, config: &AppConfig) {
        for path in &config.static_manifest {
            network.route(&format!("{ORIGIN}{path}"), 200, &format!("asset {path}"));
        }
    }

    async fn worker(network: Arc<ScriptedNetwork>, config: &AppConfig) -> ServiceWorker {
        let db = CacheDb::open_in_memory().await.unwrap();
        ServiceWorker::new(config, db, network).unwrap()
    }

    #[tokio::test]
    async fn test_install_and_activate() {
        let config = AppConfig::default();
        let network = Arc::new(ScriptedNetwork::new());
        serve_manifest(&network, &config);
        let worker = worker(network.clone(), &config).await;
        assert_eq!(worker.state(), WorkerState::Parsed);

        let outcome = worker.handle(WorkerEvent::Install).await.unwrap();
        assert_eq!(outcome, EventOutcome::Installed { cached: 5 });
        assert_eq!(worker.state(), WorkerState::Installed);

        let outcome = worker.handle(WorkerEvent::Activate).await.unwrap();
        assert_eq!(outcome, EventOutcome::Activated { purged: Vec::new() });
        assert_eq!(worker.state(), WorkerState::Activated);

        network.set_offline(true);
        let response = worker.fetch(ProxyRequest::get("/static/css/main.css")).await.unwrap();
        assert_eq!(response.resolution, Resolution::FromCache);
        assert_eq!(response.text(), "asset /static/css/main.css");
    }

    #[tokio::test]
    async fn test_install_failure_writes_nothing() {
        let config = AppConfig::default();
        let network = Arc::new(ScriptedNetwork::new());
        serve_manifest(&network, &config);
        network.route(&format!("{ORIGIN}/favicon.ico"), 404, "missing");
        let worker = worker(network, &config).await;

        let err = worker.handle(WorkerEvent::Install).await.unwrap_err();
        assert!(matches!(err, Error::InstallFailed(_)));
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(worker.proxy().db().store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_failure_when_offline() {
        let config = AppConfig::default();
        let network = Arc::new(ScriptedNetwork::new());
        network.set_offline(true);
        let worker = worker(network, &config).await;

        let err = worker.handle(WorkerEvent::Install).await.unwrap_err();
        assert!(err.to_string().starts_with("INSTALL_FAILED"));
    }

    #[tokio::test]
    async fn test_activate_purges_only_stale_stores() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let ok = StoredResponse { status: 200, headers: Vec::new(), body: b"x".to_vec() };
        for name in ["bookataxi-static-v1", "bookataxi-static-v2", "bookataxi-dynamic-v1"] {
            let store = db.open_store(name).await.unwrap();
            store.put(&RequestIdentity::get(format!("{ORIGIN}/{name}")), &ok).await.unwrap();
        }

        let network = Arc::new(ScriptedNetwork::new());
        network.respond_with(|_| Ok((200, b"asset".to_vec())));
        let mut config = AppConfig { cache_version: "v2".into(), ..Default::default() };
        config.static_manifest = vec!["/".into()];
        let worker = ServiceWorker::new(&config, db.clone(), network).unwrap();

        worker.handle(WorkerEvent::Install).await.unwrap();
        let outcome = worker.handle(WorkerEvent::Activate).await.unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Activated { purged: vec!["bookataxi-static-v1".into(), "bookataxi-dynamic-v1".into()] }
        );
        assert_eq!(db.store_names().await.unwrap(), vec!["bookataxi-static-v2", "bookataxi-dynamic-v2"]);
    }

    #[tokio::test]
    async fn test_events_out_of_order_are_rejected() {
        let config = AppConfig::default();
        let network = Arc::new(ScriptedNetwork::new());
        let worker = worker(network, &config).await;

        assert!(matches!(worker.handle(WorkerEvent::Activate).await, Err(Error::InvalidState(_))));
        assert!(matches!(
            worker.handle(WorkerEvent::Fetch(ProxyRequest::get("/"))).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            worker.handle(WorkerEvent::Sync { tag: "booking-sync".into() }).await,
            Err(Error::InvalidState(_))
        ));
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_sync_replays_only_configured_tag() {
        let config = AppConfig::default();
        let network = Arc::new(ScriptedNetwork::new());
        serve_manifest(&network, &config);
        network.route(&format!("{ORIGIN}/api/bookings"), 201, "created");
        let worker = worker(network, &config).await;
        worker.handle(WorkerEvent::Install).await.unwrap();
        worker.handle(WorkerEvent::Activate).await.unwrap();

        worker.proxy().queue().enqueue("booking-sync", &json!({"seats": 2})).await.unwrap();

        let ignored = worker.handle(WorkerEvent::Sync { tag: "newsletter".into() }).await.unwrap();
        assert_eq!(ignored, EventOutcome::Synced(None));

        let synced = worker.handle(WorkerEvent::Sync { tag: "booking-sync".into() }).await.unwrap();
        let EventOutcome::Synced(Some(report)) = synced else {
            panic!("expected a replay report");
        };
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_state_changes_are_observable() {
        let config = AppConfig::default();
        let network = Arc::new(ScriptedNetwork::new());
        serve_manifest(&network, &config);
        let worker = worker(network, &config).await;
        let mut rx = worker.subscribe();

        worker.handle(WorkerEvent::Install).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), WorkerState::Installed);

        worker.mark_redundant();
        assert_eq!(*rx.borrow_and_update(), WorkerState::Redundant);
        assert!(worker.state().is_terminal());
    }
}
