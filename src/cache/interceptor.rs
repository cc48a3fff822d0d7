// Caching interceptor - request fingerprinting, lookup and write-back
// Author: kelexine (https://github.com/kelexine)

use super::diagnostic::{closest_match, CacheMissDiagnostic};
use super::fingerprint::{canonical_string, fingerprint};
use super::models::{CacheExport, CacheStats, CachingConfig, ImportSummary, EXPORT_FORMAT_VERSION};
use super::store::{CacheStore, Namespace};
use crate::adapter::{map_to_headers, AdapterRequest, AdapterResponse, Interceptor, RequestOutcome};
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use axum::http::{header, HeaderValue};
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Header added to responses replayed from the cache.
pub const CACHE_HEADER: &str = "x-adapter-cache";

/// Process-wide saturating save counter.
///
/// Once `max` saves have been granted every further request is refused;
/// the count never goes back down.
#[derive(Debug)]
pub struct SaveLimit {
    label: &'static str,
    max: Option<u64>,
    saved: Mutex<u64>,
    warned: AtomicBool,
}

impl SaveLimit {
    pub fn new(label: &'static str, max: Option<u64>) -> Self {
        Self {
            label,
            max,
            saved: Mutex::new(0),
            warned: AtomicBool::new(false),
        }
    }

    /// Reserve one save slot. Returns false once the limit is reached.
    pub fn try_acquire(&self) -> bool {
        {
            let mut saved = self.saved.lock();
            match self.max {
                Some(max) if *saved >= max => {}
                _ => {
                    *saved += 1;
                    return true;
                }
            }
        }

        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                "Reached max_saved_{} limit ({}); further {} will not be cached",
                self.label,
                self.max.unwrap_or_default(),
                self.label
            );
        } else {
            debug!("Skipping save of {}: limit reached", self.label);
        }
        crate::metrics::record_save_skipped(self.label);
        false
    }

    /// Count a save that happened outside `try_acquire` (imports).
    pub fn record(&self) {
        *self.saved.lock() += 1;
    }

    pub fn saved(&self) -> u64 {
        *self.saved.lock()
    }
}

/// Content-addressable response cache in front of the upstream endpoint.
pub struct CacheInterceptor {
    config: CachingConfig,
    store: CacheStore,
    request_limit: SaveLimit,
    response_limit: SaveLimit,
    stats: Mutex<CacheStats>,
}

impl CacheInterceptor {
    /// Open the on-disk store and, if configured, merge the import file.
    ///
    /// A missing cache directory is created. A missing or corrupt import file
    /// is a configuration error.
    pub fn new(config: CachingConfig) -> Result<Self> {
        let dir = config
            .cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./adapter_output/cache"));
        let store = CacheStore::open(&dir)?;
        let interceptor = Self::with_store(config, store);

        if let Some(path) = interceptor.config.import_path.clone() {
            let summary = interceptor.import_from_file(&path)?;
            info!(
                "Imported cache export {}: {} request(s), {} response(s), {} failed",
                path.display(),
                summary.requests,
                summary.responses,
                summary.failed
            );
        }

        Ok(interceptor)
    }

    /// Use an already-open store.
    pub fn with_store(config: CachingConfig, store: CacheStore) -> Self {
        Self {
            request_limit: SaveLimit::new("requests", config.max_saved_requests),
            response_limit: SaveLimit::new("responses", config.max_saved_responses),
            config,
            store,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn config(&self) -> &CachingConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = *self.stats.lock();
        stats.saved_requests = self.request_limit.saved();
        stats.saved_responses = self.response_limit.saved();
        stats
    }

    fn lookup(&self, key: &str) -> Result<Option<AdapterResponse>> {
        let Some(body) = self.store.get(Namespace::Responses, key)? else {
            return Ok(None);
        };
        let stored_headers = self.store.get_headers(key)?.unwrap_or_default();

        let mut headers = map_to_headers(&stored_headers);
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers.insert(CACHE_HEADER, HeaderValue::from_static("hit"));

        Ok(Some(AdapterResponse {
            status: 200,
            headers,
            body: Bytes::from(body),
            ctx: Default::default(),
        }))
    }

    fn save_request(&self, key: &str, canonical: &str) {
        if !self.request_limit.try_acquire() {
            return;
        }
        if let Err(e) = self.store.put(Namespace::Requests, key, canonical.as_bytes()) {
            warn!("Failed to cache request {}: {}", key, e);
        }
    }

    fn save_response(&self, key: &str, response: &AdapterResponse) {
        if !self.response_limit.try_acquire() {
            return;
        }
        let written = self
            .store
            .put(Namespace::Responses, key, &response.body)
            .and_then(|_| self.store.put_headers(key, &response.headers));
        match written {
            Ok(()) => {
                crate::metrics::record_cache_write();
                debug!(request_id = %response.ctx.request_id, "Cached response {}", key);
            }
            Err(e) => warn!(
                request_id = %response.ctx.request_id,
                "Failed to cache response {}: {}",
                key,
                e
            ),
        }
    }

    fn diagnose_miss(&self, key: &str, canonical: &str) -> AdapterError {
        let closest = match closest_match(&self.store, canonical, key) {
            Ok(closest) => closest,
            Err(e) => {
                warn!("Could not scan cached requests for diagnostics: {}", e);
                None
            }
        };
        AdapterError::CacheMiss(Box::new(CacheMissDiagnostic {
            fingerprint: key.to_string(),
            request: canonical.to_string(),
            closest,
        }))
    }

    /// Snapshot every namespace of the store.
    pub fn export(&self) -> Result<CacheExport> {
        let mut export = CacheExport::new();
        for key in self.store.iter_keys(Namespace::Requests) {
            let key = key?;
            if let Some(value) = self.store.get(Namespace::Requests, &key)? {
                export.requests.insert(key, value);
            }
        }
        for key in self.store.iter_keys(Namespace::Responses) {
            let key = key?;
            if let Some(value) = self.store.get(Namespace::Responses, &key)? {
                export.responses.insert(key, value);
            }
        }
        for key in self.store.iter_keys(Namespace::Headers) {
            let key = key?;
            if let Some(value) = self.store.get_headers(&key)? {
                export.headers.insert(key, value);
            }
        }
        Ok(export)
    }

    /// Merge `export` into the store. Entries that fail are logged and skipped.
    pub fn import(&self, export: &CacheExport) -> ImportSummary {
        let mut summary = ImportSummary::default();

        for (key, value) in &export.requests {
            match self.store.put(Namespace::Requests, key, value) {
                Ok(()) => {
                    summary.requests += 1;
                    self.request_limit.record();
                }
                Err(e) => {
                    warn!("Skipping imported request {}: {}", key, e);
                    summary.failed += 1;
                }
            }
        }
        for (key, value) in &export.responses {
            match self.store.put(Namespace::Responses, key, value) {
                Ok(()) => {
                    summary.responses += 1;
                    self.response_limit.record();
                }
                Err(e) => {
                    warn!("Skipping imported response {}: {}", key, e);
                    summary.failed += 1;
                }
            }
        }
        for (key, value) in &export.headers {
            match self.store.put_header_map(key, value) {
                Ok(()) => summary.headers += 1,
                Err(e) => {
                    warn!("Skipping imported headers {}: {}", key, e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    pub fn export_to_file(&self, path: &Path) -> Result<()> {
        let export = self.export()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = bincode::serialize(&export)?;
        std::fs::write(path, encoded)?;
        info!(
            "Exported cache to {} ({} request(s), {} response(s))",
            path.display(),
            export.requests.len(),
            export.responses.len()
        );
        Ok(())
    }

    /// Read and merge an export file. Any failure to read or decode it is fatal.
    pub fn import_from_file(&self, path: &Path) -> Result<ImportSummary> {
        let bytes = std::fs::read(path).map_err(|e| {
            AdapterError::config(format!("cannot read cache export {}: {}", path.display(), e))
        })?;
        let export: CacheExport = bincode::deserialize(&bytes).map_err(|e| {
            AdapterError::config(format!("corrupt cache export {}: {}", path.display(), e))
        })?;
        if export.format_version != EXPORT_FORMAT_VERSION {
            return Err(AdapterError::config(format!(
                "cache export {} has unsupported format version {}",
                path.display(),
                export.format_version
            )));
        }
        Ok(self.import(&export))
    }
}

#[async_trait]
impl Interceptor for CacheInterceptor {
    fn name(&self) -> &str {
        "caching"
    }

    async fn intercept_request(&self, mut request: AdapterRequest) -> Result<RequestOutcome> {
        let key = fingerprint(&request.body);
        request.ctx.fingerprint = Some(key.clone());

        let canonical = canonical_string(&request.body);
        if self.config.save_requests {
            self.save_request(&key, &canonical);
        }

        if !self.config.reuse_cached_responses {
            return Ok(RequestOutcome::Continue(request));
        }

        match self.lookup(&key) {
            Ok(Some(mut cached)) => {
                self.stats.lock().hits += 1;
                crate::metrics::record_cache_hit();
                debug!(request_id = %request.ctx.request_id, "Cache hit {}", key);
                cached.ctx = request.ctx;
                cached.ctx.served_from_cache = true;
                return Ok(RequestOutcome::ShortCircuit(cached));
            }
            Ok(None) => {}
            Err(e) => warn!(
                request_id = %request.ctx.request_id,
                "Cache lookup failed for {}, treating as miss: {}",
                key,
                e
            ),
        }

        self.stats.lock().misses += 1;
        crate::metrics::record_cache_miss();
        debug!(request_id = %request.ctx.request_id, "Cache miss {}", key);

        if self.config.test_mode {
            return Err(self.diagnose_miss(&key, &canonical));
        }

        Ok(RequestOutcome::Continue(request))
    }

    async fn intercept_response(&self, response: AdapterResponse) -> Result<AdapterResponse> {
        if response.ctx.served_from_cache || !self.config.save_responses || !response.is_success() {
            return Ok(response);
        }
        if let Some(key) = response.ctx.fingerprint.clone() {
            self.save_response(&key, &response);
        }
        Ok(response)
    }

    async fn on_start(&self) -> Result<()> {
        info!(
            "Cache ready: {} stored response(s), reuse={}, test_mode={}",
            self.store.len(Namespace::Responses)?,
            self.config.reuse_cached_responses,
            self.config.test_mode
        );
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<()> {
        let stats = self.stats();
        info!(
            "Cache summary: {} hit(s), {} miss(es), {} request(s) and {} response(s) saved",
            stats.hits, stats.misses, stats.saved_requests, stats.saved_responses
        );
        if let Some(path) = &self.config.export_path {
            self.export_to_file(path)?;
        }
        Ok(())
    }
}
