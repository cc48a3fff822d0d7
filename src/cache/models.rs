//! Cache configuration, export format and bookkeeping models.

// Author: kelexine (https://github.com/kelexine)

use crate::config::default_true;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Version tag written into every export blob.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// Settings of the `caching` interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CachingConfig {
    /// Directory holding the cache database.
    /// Default: `<output_dir>/cache`
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Serve stored responses instead of calling upstream.
    #[serde(default = "default_true")]
    pub reuse_cached_responses: bool,
    /// Persist request bodies (needed for test-mode diagnostics).
    #[serde(default)]
    pub save_requests: bool,
    /// Persist successful response bodies and headers.
    #[serde(default = "default_true")]
    pub save_responses: bool,
    /// Stop saving requests after this many, for the whole process.
    #[serde(default)]
    pub max_saved_requests: Option<u64>,
    /// Stop saving responses after this many, for the whole process.
    #[serde(default)]
    pub max_saved_responses: Option<u64>,
    /// Fail every cache miss with a diagnostic instead of forwarding it.
    #[serde(default)]
    pub test_mode: bool,
    /// Export file merged into the store at startup; must exist.
    #[serde(default)]
    pub import_path: Option<PathBuf>,
    /// File that receives a full export at shutdown.
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

impl Default for CachingConfig {
    /// Provides default values for cache configuration.
    ///
    /// - `reuse_cached_responses`: true
    /// - `save_requests`: false
    /// - `save_responses`: true
    /// - no limits, no test mode, no import/export
    fn default() -> Self {
        Self {
            cache_dir: None,
            reuse_cached_responses: true,
            save_requests: false,
            save_responses: true,
            max_saved_requests: None,
            max_saved_responses: None,
            test_mode: false,
            import_path: None,
            export_path: None,
        }
    }
}

/// Portable snapshot of all three cache namespaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheExport {
    pub format_version: u32,
    /// Fingerprint → canonical request JSON.
    pub requests: BTreeMap<String, Vec<u8>>,
    /// Fingerprint → raw response body.
    pub responses: BTreeMap<String, Vec<u8>>,
    /// Fingerprint → normalised response headers.
    pub headers: BTreeMap<String, BTreeMap<String, String>>,
}

impl CacheExport {
    pub fn new() -> Self {
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.responses.is_empty() && self.headers.is_empty()
    }
}

/// Outcome of merging a [`CacheExport`] into a live store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub requests: u64,
    pub responses: u64,
    pub headers: u64,
    pub failed: u64,
}

/// Statistics for cache operations in this process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of calls served from the store.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// Number of requests persisted (including imported ones).
    pub saved_requests: u64,
    /// Number of responses persisted (including imported ones).
    pub saved_responses: u64,
}
