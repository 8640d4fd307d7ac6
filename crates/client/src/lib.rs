//! Caching proxy worker for offcache.
//!
//! This crate provides request classification, the caching strategies, the
//! offline write queue and the worker lifecycle shared by the server.

pub mod classify;
pub mod fetch;
pub mod lifecycle;
pub mod proxy;
pub mod response;
pub mod strategy;
pub mod sync;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{BypassReason, Classification, Classifier, RequestClass};
pub use fetch::{FetchConfig, FetchRequest, FetchResponse, HttpNetwork, Network};
pub use lifecycle::{EventOutcome, Registration, RegistrationCallbacks, ServiceWorker, WorkerEvent, WorkerState};
pub use proxy::CacheProxy;
pub use reqwest::{Method, StatusCode, Url, header};
pub use response::{ProxyRequest, ProxyResponse, Resolution};
pub use strategy::{Strategy, StoreNames, StrategyContext, route};
pub use sync::{OfflineQueue, ReplayReport};
pub use tasks::PendingWork;
