//! Request classification.
//!
//! Rules live in one ordered list and the first match wins, which fixes the
//! tie-break order: static asset, then API call, then image, else document.
//! `/static/logo.png` is therefore a static asset and `/api/avatar.svg` an
//! API call.

use offcache_core::{AppConfig, Error};
use regex::Regex;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

const STATIC_EXTENSIONS: &[&str] = &[".js", ".css", ".woff", ".woff2"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];

/// Category of an intercepted GET request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    StaticAsset,
    ApiCall,
    Image,
    Document,
}

/// Why a request is passed straight to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassReason {
    /// Only GET requests are cached.
    NotGet,
    /// Extension and other non-http(s) resources.
    UnsupportedScheme,
    /// Outside the registration origin.
    CrossOrigin,
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Bypass(BypassReason),
    Class(RequestClass),
}

#[derive(Debug)]
enum Matcher {
    PathContains(String),
    PathPrefix(String),
    PathSuffix(&'static [&'static str]),
    PathPattern(Regex),
}

impl Matcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Matcher::PathContains(segment) => path.contains(segment.as_str()),
            Matcher::PathPrefix(prefix) => path.starts_with(prefix.as_str()),
            Matcher::PathSuffix(suffixes) => suffixes.iter().any(|s| path.ends_with(s)),
            Matcher::PathPattern(re) => re.is_match(path),
        }
    }
}

/// Ordered URL rules mapping GET requests onto a [`RequestClass`].
#[derive(Debug)]
pub struct Classifier {
    rules: Vec<(RequestClass, Matcher)>,
}

impl Classifier {
    /// Build the rule list from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if an API pattern is not a valid regex.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let mut rules = vec![
            (RequestClass::StaticAsset, Matcher::PathContains(config.static_segment.clone())),
            (RequestClass::StaticAsset, Matcher::PathSuffix(STATIC_EXTENSIONS)),
            (RequestClass::ApiCall, Matcher::PathPrefix(config.api_prefix.clone())),
        ];

        for pattern in &config.api_patterns {
            let re = Regex::new(pattern)
                .map_err(|e| Error::InvalidInput(format!("invalid API pattern {pattern:?}: {e}")))?;
            rules.push((RequestClass::ApiCall, Matcher::PathPattern(re)));
        }

        rules.push((RequestClass::Image, Matcher::PathSuffix(IMAGE_EXTENSIONS)));

        Ok(Self { rules })
    }

    /// Classify by URL path alone. Never fails: unmatched paths are documents.
    pub fn classify_path(&self, path: &str) -> RequestClass {
        self.rules
            .iter()
            .find(|(_, matcher)| matcher.matches(path))
            .map(|(class, _)| *class)
            .unwrap_or(RequestClass::Document)
    }

    /// Classify a request, or decide it bypasses the cache.
    pub fn classify(&self, method: &Method, url: &Url) -> Classification {
        if method != Method::GET {
            return Classification::Bypass(BypassReason::NotGet);
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Classification::Bypass(BypassReason::UnsupportedScheme);
        }
        Classification::Class(self.classify_path(url.path()))
    }
}
