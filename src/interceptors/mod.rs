//! Built-in interceptors besides the cache.
//!
//! - `stats`: run-wide response statistics (`response_stats`).
//! - `progress`: sample-count and timer progress reports (`progress_tracking`).
//! - `reasoning`: strips reasoning spans from answers (`reasoning`).
//! - `payload`: adds, removes and renames request parameters (`payload_modifier`).
//! - `system_message`: injects a system prompt (`system_message`).
//! - `logging`: sanitized request/response logging (`request_logging`, `response_logging`).
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod payload;
pub mod progress;
pub mod reasoning;
pub mod stats;
pub mod system_message;

pub use logging::{LoggingInterceptorConfig, RequestLoggingInterceptor, ResponseLoggingInterceptor};
pub use payload::{PayloadConfig, PayloadModifierInterceptor};
pub use progress::{ProgressConfig, ProgressInterceptor, ProgressState};
pub use reasoning::{ReasoningConfig, ReasoningInterceptor};
pub use stats::{ResponseStats, ResponseStatsInterceptor, StatsConfig};
pub use system_message::{Strategy, SystemMessageConfig, SystemMessageInterceptor};

use crate::adapter::{ComponentContext, ComponentRegistry, Interceptor};
use crate::config::parse_component_config;
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

fn build_response_stats(config: &Value, ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let settings: StatsConfig = parse_component_config("response_stats", config)?;
    Ok(Arc::new(ResponseStatsInterceptor::new(settings, &ctx.output_dir)))
}

fn build_progress(config: &Value, ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let settings: ProgressConfig = parse_component_config("progress_tracking", config)?;
    Ok(Arc::new(ProgressInterceptor::new(settings, ctx.http_client.clone())))
}

fn build_reasoning(config: &Value, _ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let settings: ReasoningConfig = parse_component_config("reasoning", config)?;
    Ok(Arc::new(ReasoningInterceptor::new(settings)?))
}

fn build_payload_modifier(config: &Value, _ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let settings: PayloadConfig = parse_component_config("payload_modifier", config)?;
    Ok(Arc::new(PayloadModifierInterceptor::new(settings)?))
}

fn build_system_message(config: &Value, _ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let settings: SystemMessageConfig = parse_component_config("system_message", config)?;
    Ok(Arc::new(SystemMessageInterceptor::new(settings)?))
}

fn build_request_logging(config: &Value, _ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let settings: LoggingInterceptorConfig = parse_component_config("request_logging", config)?;
    Ok(Arc::new(RequestLoggingInterceptor::new(settings)))
}

fn build_response_logging(config: &Value, _ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let settings: LoggingInterceptorConfig = parse_component_config("response_logging", config)?;
    Ok(Arc::new(ResponseLoggingInterceptor::new(settings)))
}

pub(crate) fn register_builtins(registry: &mut ComponentRegistry) {
    registry.insert_interceptor("response_stats", Arc::new(build_response_stats));
    registry.insert_interceptor("progress_tracking", Arc::new(build_progress));
    registry.insert_interceptor("reasoning", Arc::new(build_reasoning));
    registry.insert_interceptor("payload_modifier", Arc::new(build_payload_modifier));
    registry.insert_interceptor("system_message", Arc::new(build_system_message));
    registry.insert_interceptor("request_logging", Arc::new(build_request_logging));
    registry.insert_interceptor("response_logging", Arc::new(build_response_logging));
}
