//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Cache store and offline write queue storage with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStore, CachedEntry, PendingWrite, RequestIdentity, StorageEstimate, StoredResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
