//! SQLite-backed cache stores and offline write queue.
//!
//! This module provides persistent storage using SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Named, versioned stores keyed by SHA-256 request identity
//! - Success-only captures with whole-entry replacement
//! - All-or-nothing batch population for install manifests
//! - Stale store deletion across versions
//! - A per-tag queue of writes awaiting background sync
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod queue;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CachedEntry, RequestIdentity, StoredResponse};
pub use queue::PendingWrite;
pub use stores::{CacheStore, StorageEstimate};
