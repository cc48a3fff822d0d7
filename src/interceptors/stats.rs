//! Response statistics aggregated across the whole evaluation run.
//!
//! Every non-cached response bumps the total and per-status counters.
//! Responses whose body parses as a chat/completions payload carrying a
//! `usage` block additionally feed the token, latency, finish-reason and
//! tool-call aggregates. Means are maintained incrementally
//! (`mean += (x - mean) / n`).
//!
//! The aggregate survives restarts: it is persisted to a state file in the
//! stats cache directory, and loading it bumps `run_id` instead of resetting
//! anything. A copy is written under the `response_stats` key of the
//! metrics file for downstream tooling.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::adapter::{AdapterResponse, Interceptor};
use crate::config::default_true;
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STATE_FILE: &str = "response_stats.json";
const METRICS_FILE: &str = "adapter_metrics.json";
const METRICS_KEY: &str = "response_stats";

/// Settings of the `response_stats` interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    /// Directory of the persisted aggregate.
    /// Default: `<output_dir>/response_stats`
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Metrics file receiving the `response_stats` object.
    /// Default: `<output_dir>/adapter_metrics.json`
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub collect_token_stats: bool,
    #[serde(default = "default_true")]
    pub collect_finish_reasons: bool,
    #[serde(default = "default_true")]
    pub collect_tool_calls: bool,
    /// Persist every N responses; 0 persists at shutdown only.
    #[serde(default)]
    pub save_interval: u64,
    /// Log the aggregate every N responses; 0 disables.
    #[serde(default)]
    pub log_interval: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            metrics_file: None,
            collect_token_stats: true,
            collect_finish_reasons: true,
            collect_tool_calls: true,
            save_interval: 0,
            log_interval: 0,
        }
    }
}

/// The run-wide aggregate. Absent detail stats serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseStats {
    pub count: u64,
    pub successful_count: u64,
    pub avg_prompt_tokens: Option<f64>,
    pub avg_completion_tokens: Option<f64>,
    pub avg_total_tokens: Option<f64>,
    pub max_prompt_tokens: Option<u64>,
    pub max_completion_tokens: Option<u64>,
    pub max_total_tokens: Option<u64>,
    pub avg_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub tool_calls_count: u64,
    pub status_codes: BTreeMap<String, u64>,
    pub finish_reason: BTreeMap<String, u64>,
    pub run_id: u64,
    pub last_updated: Option<String>,
}

/// Detail extracted from a parseable response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSample {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub finish_reasons: Vec<String>,
    pub tool_calls: u64,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    finish_reason: Option<String>,
    message: Option<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    tool_calls: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

/// Parse the detail of a response body. `None` for anything without `usage`.
pub fn parse_usage(body: &[u8]) -> Option<UsageSample> {
    let wire: WireResponse = serde_json::from_slice(body).ok()?;
    let usage = wire.usage?;

    let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
    let completion_tokens = usage.completion_tokens.unwrap_or(0);
    let total_tokens = usage
        .total_tokens
        .unwrap_or(prompt_tokens.saturating_add(completion_tokens));

    Some(UsageSample {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        finish_reasons: wire
            .choices
            .iter()
            .filter_map(|c| c.finish_reason.clone())
            .collect(),
        tool_calls: wire
            .choices
            .iter()
            .filter_map(|c| c.message.as_ref()?.tool_calls.as_ref())
            .map(|calls| calls.len() as u64)
            .fold(0, u64::saturating_add),
    })
}

fn running_mean(mean: Option<f64>, x: f64, n: u64) -> f64 {
    match mean {
        Some(m) if n > 1 => m + (x - m) / n as f64,
        _ => x,
    }
}

fn running_max<T: PartialOrd + Copy>(max: Option<T>, x: T) -> T {
    match max {
        Some(m) if m >= x => m,
        _ => x,
    }
}

fn bump(counter: &mut u64) {
    *counter = counter.saturating_add(1);
}

impl ResponseStats {
    /// Fold one response into the aggregate.
    pub fn record(
        &mut self,
        status: u16,
        sample: Option<&UsageSample>,
        latency_ms: f64,
        config: &StatsConfig,
    ) {
        self.count = self.count.saturating_add(1);
        bump(self.status_codes.entry(status.to_string()).or_insert(0));

        if let Some(sample) = sample {
            self.successful_count = self.successful_count.saturating_add(1);
            let n = self.successful_count;

            if config.collect_token_stats {
                let (p, c, t) = (sample.prompt_tokens, sample.completion_tokens, sample.total_tokens);
                self.avg_prompt_tokens = Some(running_mean(self.avg_prompt_tokens, p as f64, n));
                self.avg_completion_tokens =
                    Some(running_mean(self.avg_completion_tokens, c as f64, n));
                self.avg_total_tokens = Some(running_mean(self.avg_total_tokens, t as f64, n));
                self.max_prompt_tokens = Some(running_max(self.max_prompt_tokens, p));
                self.max_completion_tokens = Some(running_max(self.max_completion_tokens, c));
                self.max_total_tokens = Some(running_max(self.max_total_tokens, t));
            }

            self.avg_latency_ms = Some(running_mean(self.avg_latency_ms, latency_ms, n));
            self.max_latency_ms = Some(running_max(self.max_latency_ms, latency_ms));

            if config.collect_finish_reasons {
                for reason in &sample.finish_reasons {
                    bump(self.finish_reason.entry(reason.clone()).or_insert(0));
                }
            }
            if config.collect_tool_calls {
                self.tool_calls_count = self.tool_calls_count.saturating_add(sample.tool_calls);
            }
        }

        self.last_updated = Some(chrono::Utc::now().to_rfc3339());
    }
}

/// Write JSON through a temporary file so readers never see a partial file.
fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    // Unique per writer so concurrent saves never share a temp file
    let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Aggregates response metadata for the run.
pub struct ResponseStatsInterceptor {
    config: StatsConfig,
    state_path: PathBuf,
    metrics_path: PathBuf,
    stats: Mutex<ResponseStats>,
    /// Serializes snapshot + state write + metrics merge.
    persist: Mutex<()>,
}

impl ResponseStatsInterceptor {
    pub fn new(config: StatsConfig, output_dir: &Path) -> Self {
        let state_dir = config
            .cache_dir
            .clone()
            .unwrap_or_else(|| output_dir.join("response_stats"));
        let metrics_path = config
            .metrics_file
            .clone()
            .unwrap_or_else(|| output_dir.join(METRICS_FILE));

        Self {
            config,
            state_path: state_dir.join(STATE_FILE),
            metrics_path,
            stats: Mutex::new(ResponseStats::default()),
            persist: Mutex::new(()),
        }
    }

    /// Copy of the current aggregate.
    pub fn snapshot(&self) -> ResponseStats {
        self.stats.lock().clone()
    }

    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }

    /// Load persisted state, bumping `run_id`. Missing state starts fresh.
    pub fn load_state(&self) -> Result<()> {
        if !self.state_path.exists() {
            debug!("No stats state at {}, starting fresh", self.state_path.display());
            return Ok(());
        }

        let bytes = std::fs::read(&self.state_path)?;
        let mut loaded: ResponseStats = serde_json::from_slice(&bytes).map_err(|e| {
            AdapterError::config(format!(
                "corrupt stats state {}: {}",
                self.state_path.display(),
                e
            ))
        })?;
        loaded.run_id += 1;

        info!(
            "Resumed response stats from {} (run_id={}, count={})",
            self.state_path.display(),
            loaded.run_id,
            loaded.count
        );
        *self.stats.lock() = loaded;
        Ok(())
    }

    /// Persist the aggregate to the state file and the metrics file.
    pub fn save(&self) -> Result<()> {
        let _guard = self.persist.lock();
        let snapshot = self.snapshot();
        let value = serde_json::to_value(&snapshot)?;
        write_json_atomic(&self.state_path, &value)?;

        // Other tooling may own further keys of the metrics file.
        let mut metrics = std::fs::read(&self.metrics_path)
            .ok()
            .and_then(|b| serde_json::from_slice::<serde_json::Value>(&b).ok())
            .filter(|v| v.is_object())
            .unwrap_or_else(|| serde_json::json!({}));
        metrics[METRICS_KEY] = value;
        write_json_atomic(&self.metrics_path, &metrics)?;

        debug!("Saved response stats to {}", self.metrics_path.display());
        Ok(())
    }
}

#[async_trait]
impl Interceptor for ResponseStatsInterceptor {
    fn name(&self) -> &str {
        "response_stats"
    }

    async fn intercept_response(&self, response: AdapterResponse) -> Result<AdapterResponse> {
        if response.ctx.served_from_cache {
            return Ok(response);
        }

        let sample = parse_usage(&response.body);
        if sample.is_none() {
            debug!(
                request_id = %response.ctx.request_id,
                "Response body has no usage data; counting status only"
            );
        }
        let latency_ms = response.ctx.elapsed().as_secs_f64() * 1000.0;

        let count = {
            let mut stats = self.stats.lock();
            stats.record(response.status, sample.as_ref(), latency_ms, &self.config);
            stats.count
        };

        if self.config.log_interval > 0 && count % self.config.log_interval == 0 {
            let snapshot = self.snapshot();
            info!(
                "Response stats: count={} successful={} avg_total_tokens={:?} avg_latency_ms={:?}",
                snapshot.count,
                snapshot.successful_count,
                snapshot.avg_total_tokens,
                snapshot.avg_latency_ms
            );
        }

        if self.config.save_interval > 0 && count % self.config.save_interval == 0 {
            if let Err(e) = self.save() {
                warn!("Failed to persist response stats: {}", e);
            }
        }

        Ok(response)
    }

    async fn on_start(&self) -> Result<()> {
        self.load_state()
    }

    async fn on_shutdown(&self) -> Result<()> {
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(prompt: u64, completion: u64, reason: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "choices": [{"finish_reason": reason, "message": {"role": "assistant", "content": "x"}}],
            "usage": {
                "prompt_tokens": prompt,
                "completion_tokens": completion,
                "total_tokens": prompt + completion
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_incremental_means() {
        let config = StatsConfig::default();
        let mut stats = ResponseStats::default();
        for p in [100, 200, 150] {
            let sample = parse_usage(&body(p, 10, "stop")).unwrap();
            stats.record(200, Some(&sample), 5.0, &config);
        }

        assert_eq!(stats.avg_prompt_tokens, Some(150.0));
        assert_eq!(stats.max_prompt_tokens, Some(200));
        assert_eq!(stats.avg_completion_tokens, Some(10.0));
        assert_eq!(stats.max_total_tokens, Some(210));
        assert_eq!(stats.finish_reason.get("stop"), Some(&3));
        assert_eq!(stats.successful_count, 3);
    }

    #[test]
    fn test_malformed_body_counts_status_only() {
        let config = StatsConfig::default();
        let mut stats = ResponseStats::default();
        let sample = parse_usage(b"<html>bad gateway</html>");
        assert!(sample.is_none());

        stats.record(502, sample.as_ref(), 1.0, &config);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.successful_count, 0);
        assert_eq!(stats.status_codes.get("502"), Some(&1));
        assert_eq!(stats.avg_prompt_tokens, None);
    }

    #[test]
    fn test_tool_calls_and_missing_total() {
        let raw = json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {"tool_calls": [{"id": "a"}, {"id": "b"}]}
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3}
        });
        let sample = parse_usage(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert_eq!(sample.total_tokens, 10);
        assert_eq!(sample.tool_calls, 2);
        assert_eq!(sample.finish_reasons, vec!["tool_calls"]);
    }

    #[test]
    fn test_absent_details_serialize_as_null() {
        let value = serde_json::to_value(ResponseStats::default()).unwrap();
        for key in [
            "count",
            "successful_count",
            "avg_prompt_tokens",
            "avg_completion_tokens",
            "avg_total_tokens",
            "max_prompt_tokens",
            "max_completion_tokens",
            "max_total_tokens",
            "status_codes",
            "finish_reason",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        assert!(value["avg_prompt_tokens"].is_null());
    }

    #[test]
    fn test_disabled_collectors_leave_fields_empty() {
        let config = StatsConfig {
            collect_token_stats: false,
            collect_finish_reasons: false,
            ..Default::default()
        };
        let mut stats = ResponseStats::default();
        let sample = parse_usage(&body(5, 5, "length")).unwrap();
        stats.record(200, Some(&sample), 2.0, &config);

        assert_eq!(stats.successful_count, 1);
        assert!(stats.avg_prompt_tokens.is_none());
        assert!(stats.finish_reason.is_empty());
        assert_eq!(stats.avg_latency_ms, Some(2.0));
    }

    #[test]
    fn test_extreme_token_counts_saturate() {
        let raw = json!({
            "choices": [{"finish_reason": "stop", "message": {"content": "x"}}],
            "usage": {"prompt_tokens": u64::MAX, "completion_tokens": 1}
        });
        let sample = parse_usage(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert_eq!(sample.total_tokens, u64::MAX);

        let mut stats = ResponseStats {
            count: u64::MAX,
            tool_calls_count: u64::MAX,
            ..Default::default()
        };
        let sample = UsageSample {
            tool_calls: 3,
            ..sample
        };
        stats.record(200, Some(&sample), 1.0, &StatsConfig::default());
        assert_eq!(stats.count, u64::MAX);
        assert_eq!(stats.tool_calls_count, u64::MAX);
        assert_eq!(stats.max_total_tokens, Some(u64::MAX));
    }
}
