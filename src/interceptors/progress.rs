//! Evaluation progress reporting.
//!
//! Counts response-phase calls and tells an external listener how many
//! samples have been processed. A report fires every `interval` samples, or
//! from a background timer every `interval_secs` when something new was
//! processed since the last report. The first `skip_initial_requests` calls
//! are not counted at all.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::adapter::{AdapterResponse, Interceptor};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

fn default_interval() -> u64 {
    1
}

/// Settings of the `progress_tracking` interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressConfig {
    /// Endpoint receiving `POST {"samples_processed": n}`.
    #[serde(default)]
    pub progress_url: Option<String>,
    /// Report every N samples; 0 disables the sample trigger.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Timer trigger period in seconds.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub skip_initial_requests: u64,
    /// File overwritten with the latest count on every report.
    #[serde(default)]
    pub progress_file: Option<PathBuf>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            progress_url: None,
            interval: default_interval(),
            interval_secs: None,
            skip_initial_requests: 0,
            progress_file: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub processed: u64,
    pub last_reported: u64,
    pub skipped: u64,
}

struct Reporter {
    config: ProgressConfig,
    client: Client,
    state: Mutex<ProgressState>,
    /// Highest count delivered so far; held across a send so reports stay ordered.
    sent: tokio::sync::Mutex<u64>,
}

impl Reporter {
    /// Count one call. Returns the total to report, if this call triggers one.
    fn record(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.skipped < self.config.skip_initial_requests {
            state.skipped += 1;
            return None;
        }

        state.processed += 1;
        let interval = self.config.interval;
        if interval > 0 && state.processed % interval == 0 {
            state.last_reported = state.processed;
            return Some(state.processed);
        }
        None
    }

    /// Claim a report if anything changed since the last one.
    fn take_pending(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.processed != state.last_reported {
            state.last_reported = state.processed;
            Some(state.processed)
        } else {
            None
        }
    }

    async fn emit(&self, processed: u64) {
        let mut sent = self.sent.lock().await;
        if processed <= *sent {
            debug!("Dropping stale progress report {} (already sent {})", processed, *sent);
            return;
        }
        *sent = processed;
        debug!("Progress: {} samples processed", processed);

        if let Some(path) = &self.config.progress_file {
            if let Err(e) = tokio::fs::write(path, processed.to_string()).await {
                warn!("Failed to write progress file {}: {}", path.display(), e);
            }
        }

        let Some(url) = &self.config.progress_url else {
            return;
        };

        let result = self
            .client
            .post(url)
            .json(&serde_json::json!({ "samples_processed": processed }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        match result {
            Ok(_) => crate::metrics::record_progress_report(true),
            Err(e) => {
                crate::metrics::record_progress_report(false);
                warn!("Failed to report progress ({} samples) to {}: {}", processed, url, e);
            }
        }
    }
}

pub struct ProgressInterceptor {
    reporter: Arc<Reporter>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressInterceptor {
    pub fn new(config: ProgressConfig, client: Client) -> Self {
        Self {
            reporter: Arc::new(Reporter {
                config,
                client,
                state: Mutex::new(ProgressState::default()),
                sent: tokio::sync::Mutex::new(0),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProgressState {
        *self.reporter.state.lock()
    }
}

#[async_trait]
impl Interceptor for ProgressInterceptor {
    fn name(&self) -> &str {
        "progress_tracking"
    }

    async fn intercept_response(&self, response: AdapterResponse) -> Result<AdapterResponse> {
        if let Some(processed) = self.reporter.record() {
            self.reporter.emit(processed).await;
        }
        Ok(response)
    }

    async fn on_start(&self) -> Result<()> {
        let Some(secs) = self.reporter.config.interval_secs.filter(|s| *s > 0) else {
            return Ok(());
        };

        let reporter = Arc::clone(&self.reporter);
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(secs);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Some(processed) = reporter.take_pending() {
                    reporter.emit(processed).await;
                }
            }
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
        info!("Progress timer started ({}s)", secs);
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<()> {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }

        if let Some(processed) = self.reporter.take_pending() {
            info!("Final progress report: {} samples", processed);
            self.reporter.emit(processed).await;
        }
        Ok(())
    }
}

impl Drop for ProgressInterceptor {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RequestContext;

    fn interceptor(config: ProgressConfig) -> ProgressInterceptor {
        ProgressInterceptor::new(config, Client::new())
    }

    async fn respond(p: &ProgressInterceptor) {
        let resp = AdapterResponse::new(200, "{}", RequestContext::default());
        p.intercept_response(resp).await.unwrap();
    }

    #[tokio::test]
    async fn test_sample_interval_marks_reports() {
        let p = interceptor(ProgressConfig {
            interval: 3,
            ..Default::default()
        });
        for _ in 0..7 {
            respond(&p).await;
        }
        let state = p.state();
        assert_eq!(state.processed, 7);
        assert_eq!(state.last_reported, 6);

        p.on_shutdown().await.unwrap();
        assert_eq!(p.state().last_reported, 7);
    }

    #[tokio::test]
    async fn test_skip_initial_requests() {
        let p = interceptor(ProgressConfig {
            skip_initial_requests: 2,
            ..Default::default()
        });
        for _ in 0..3 {
            respond(&p).await;
        }
        let state = p.state();
        assert_eq!(state.skipped, 2);
        assert_eq!(state.processed, 1);
    }

    #[tokio::test]
    async fn test_progress_file_receives_count() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("progress");
        let p = interceptor(ProgressConfig {
            interval: 2,
            progress_file: Some(file.clone()),
            ..Default::default()
        });
        for _ in 0..4 {
            respond(&p).await;
        }
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "4");
    }

    #[tokio::test]
    async fn test_reports_never_go_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("progress");
        let p = interceptor(ProgressConfig {
            progress_file: Some(file.clone()),
            ..Default::default()
        });

        p.reporter.emit(7).await;
        p.reporter.emit(6).await;
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "7");

        let sends = (1..=32u64).rev().map(|n| {
            let reporter = Arc::clone(&p.reporter);
            tokio::spawn(async move { reporter.emit(n).await })
        });
        for send in sends {
            send.await.unwrap();
        }
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "32");
        assert_eq!(*p.reporter.sent.lock().await, 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_reports_pending_samples() {
        let p = interceptor(ProgressConfig {
            interval: 0,
            interval_secs: Some(5),
            ..Default::default()
        });
        p.on_start().await.unwrap();
        respond(&p).await;
        assert_eq!(p.state().last_reported, 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(p.state().last_reported, 1);

        p.on_shutdown().await.unwrap();
        assert!(p.timer.lock().is_none());
    }
}
