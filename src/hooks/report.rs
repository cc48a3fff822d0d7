//! Post-evaluation report built from the response cache.
//!
//! Reads the store the `caching` interceptor wrote during the run and dumps
//! a bounded, fingerprint-sorted list of request/response pairs. Bodies that
//! parse as JSON are embedded as JSON, anything else as a string.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::adapter::{Hook, HookContext};
use crate::cache::{CacheStore, Namespace};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};

fn default_report_file() -> String {
    "eval_report.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Cache directory to read. Default: `<output_dir>/cache`
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_report_file")]
    pub report_file: String,
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            report_file: default_report_file(),
            max_entries: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub fingerprint: String,
    /// `null` when the request body was not saved.
    pub request: Value,
    pub response: Value,
}

fn decode(bytes: Option<Vec<u8>>) -> Value {
    match bytes {
        None => Value::Null,
        Some(b) => serde_json::from_slice(&b)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&b).into_owned())),
    }
}

/// Collect up to `max` entries, keyed by stored responses.
pub fn collect_entries(store: &CacheStore, max: Option<usize>) -> Result<Vec<ReportEntry>> {
    let mut entries = Vec::new();
    for key in store.iter_keys(Namespace::Responses) {
        if max.is_some_and(|m| entries.len() >= m) {
            break;
        }
        let key = key?;
        entries.push(ReportEntry {
            request: decode(store.get(Namespace::Requests, &key)?),
            response: decode(store.get(Namespace::Responses, &key)?),
            fingerprint: key,
        });
    }
    Ok(entries)
}

pub struct PostEvalReportHook {
    config: ReportConfig,
}

impl PostEvalReportHook {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Hook for PostEvalReportHook {
    fn name(&self) -> &str {
        "post_eval_report"
    }

    async fn run(&self, ctx: &HookContext) -> Result<()> {
        let cache_dir = self
            .config
            .cache_dir
            .clone()
            .unwrap_or_else(|| ctx.output_dir.join("cache"));

        let entries = if cache_dir.exists() {
            let store = CacheStore::open(&cache_dir)?;
            collect_entries(&store, self.config.max_entries)?
        } else {
            warn!("No cache at {}; writing an empty report", cache_dir.display());
            Vec::new()
        };

        tokio::fs::create_dir_all(&ctx.output_dir).await?;
        let path = ctx.output_dir.join(&self.config.report_file);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&entries)?).await?;

        info!("Wrote {} report entries to {}", entries.len(), path.display());
        Ok(())
    }
}
