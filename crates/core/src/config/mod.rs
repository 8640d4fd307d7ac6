//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCACHE_*)
//! 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFCACHE_*)
/// 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite database holding cache stores and the write queue.
    ///
    /// Set via OFFCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the worker is registered for. Requests for other origins are
    /// not intercepted.
    ///
    /// Set via OFFCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix shared by both store names.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version tag embedded in both store names. Bumping it makes the next
    /// activation purge the previous generation.
    ///
    /// Set via OFFCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Paths cached unconditionally at install. Must match the build output.
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// Path segment marking build assets.
    #[serde(default = "default_static_segment")]
    pub static_segment: String,

    /// Path prefix marking API calls.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Extra regex patterns treated as API calls.
    #[serde(default = "default_api_patterns")]
    pub api_patterns: Vec<String>,

    /// Background sync tag that triggers queue replay.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Endpoint queued writes are replayed against.
    #[serde(default = "default_sync_endpoint")]
    pub sync_endpoint: String,

    /// Mutation paths whose network failures are queued for replay.
    #[serde(default = "default_queued_write_paths")]
    pub queued_write_paths: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OFFCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via OFFCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Quota reported by storage estimates.
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_cache_prefix() -> String {
    "bookataxi".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_static_manifest() -> Vec<String> {
    ["/", "/static/js/bundle.js", "/static/css/main.css", "/manifest.json", "/favicon.ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_static_segment() -> String {
    "/static/".into()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_api_patterns() -> Vec<String> {
    vec![r"/api/services".into(), r"/api/locations".into()]
}

fn default_sync_tag() -> String {
    "booking-sync".into()
}

fn default_sync_endpoint() -> String {
    "/api/bookings".into()
}

fn default_queued_write_paths() -> Vec<String> {
    vec!["/api/bookings".into()]
}

fn default_user_agent() -> String {
    "offcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_storage_quota_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            static_manifest: default_static_manifest(),
            static_segment: default_static_segment(),
            api_prefix: default_api_prefix(),
            api_patterns: default_api_patterns(),
            sync_tag: default_sync_tag(),
            sync_endpoint: default_sync_endpoint(),
            queued_write_paths: default_queued_write_paths(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            storage_quota_bytes: default_storage_quota_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the current static store, e.g. `bookataxi-static-v1`.
    pub fn static_store_name(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.cache_version)
    }

    /// Name of the current dynamic store, e.g. `bookataxi-dynamic-v1`.
    pub fn dynamic_store_name(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCACHE_`
    /// 2. TOML file from `OFFCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
