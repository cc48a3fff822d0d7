// Adapter pipeline - drives calls through the interceptor chain
// Author: kelexine (https://github.com/kelexine)

use super::types::{AdapterRequest, AdapterResponse, Hook, HookContext, Interceptor, RequestOutcome};
use super::upstream::Upstream;
use crate::error::{AdapterError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered interceptors plus lifecycle hooks around one evaluation run.
pub struct AdapterPipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    pre_eval_hooks: Vec<Arc<dyn Hook>>,
    post_eval_hooks: Vec<Arc<dyn Hook>>,
    upstream: Arc<dyn Upstream>,
    hook_ctx: HookContext,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl AdapterPipeline {
    /// Assemble a pipeline. Fails if nothing at all is enabled.
    pub fn new(
        interceptors: Vec<Arc<dyn Interceptor>>,
        pre_eval_hooks: Vec<Arc<dyn Hook>>,
        post_eval_hooks: Vec<Arc<dyn Hook>>,
        upstream: Arc<dyn Upstream>,
        output_dir: PathBuf,
    ) -> Result<Self> {
        if interceptors.is_empty() && pre_eval_hooks.is_empty() && post_eval_hooks.is_empty() {
            return Err(AdapterError::config(
                "adapter has no enabled interceptors or hooks; refusing to run a no-op proxy",
            ));
        }

        let components = interceptors
            .iter()
            .map(|i| i.name().to_string())
            .chain(pre_eval_hooks.iter().map(|h| h.name().to_string()))
            .chain(post_eval_hooks.iter().map(|h| h.name().to_string()))
            .collect();

        Ok(Self {
            interceptors,
            pre_eval_hooks,
            post_eval_hooks,
            upstream,
            hook_ctx: HookContext {
                output_dir,
                components,
            },
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Names of all active components, interceptors first.
    pub fn components(&self) -> &[String] {
        &self.hook_ctx.components
    }

    /// Run pre-evaluation hooks, then let every interceptor load its state.
    ///
    /// Only the first call has an effect.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for hook in &self.pre_eval_hooks {
            info!("Running pre-eval hook '{}'", hook.name());
            hook.run(&self.hook_ctx).await?;
        }

        for interceptor in &self.interceptors {
            interceptor.on_start().await?;
        }

        info!(
            "Adapter pipeline started with {} interceptor(s): [{}]",
            self.interceptors.len(),
            self.interceptors
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    /// Drive one call through the chain.
    ///
    /// Request-phase errors fail the call. Response-phase errors are logged and
    /// the response continues down the chain unchanged.
    pub async fn process(&self, request: AdapterRequest) -> Result<AdapterResponse> {
        let request_id = request.ctx.request_id.clone();

        let mut response = match self.run_request_phase(request).await? {
            RequestOutcome::ShortCircuit(response) => {
                debug!(request_id = %request_id, "Request phase short-circuited");
                response
            }
            RequestOutcome::Continue(request) => self.upstream.send(&request).await?,
        };

        for interceptor in &self.interceptors {
            match interceptor.intercept_response(response.clone()).await {
                Ok(next) => response = next,
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        "Interceptor '{}' failed on response, continuing: {}",
                        interceptor.name(),
                        e
                    );
                    crate::metrics::record_interceptor_failure(interceptor.name());
                }
            }
        }

        crate::metrics::record_request(
            response.status,
            response.ctx.served_from_cache,
            response.ctx.elapsed().as_secs_f64(),
        );
        Ok(response)
    }

    async fn run_request_phase(&self, mut request: AdapterRequest) -> Result<RequestOutcome> {
        for interceptor in &self.interceptors {
            match interceptor.intercept_request(request).await? {
                RequestOutcome::Continue(next) => request = next,
                short @ RequestOutcome::ShortCircuit(_) => return Ok(short),
            }
        }
        Ok(RequestOutcome::Continue(request))
    }

    /// Flush interceptor state, then run post-evaluation hooks.
    ///
    /// Failures are logged; every component still gets its turn. Only the
    /// first call has an effect.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        for interceptor in &self.interceptors {
            if let Err(e) = interceptor.on_shutdown().await {
                warn!("Interceptor '{}' failed during shutdown: {}", interceptor.name(), e);
            }
        }

        for hook in &self.post_eval_hooks {
            info!("Running post-eval hook '{}'", hook.name());
            if let Err(e) = hook.run(&self.hook_ctx).await {
                warn!("Post-eval hook '{}' failed: {}", hook.name(), e);
            }
        }

        info!("Adapter pipeline shut down");
    }
}
