// Built-in lifecycle hooks
// Author: kelexine (https://github.com/kelexine)

pub mod report;
pub mod run_metadata;

pub use report::{PostEvalReportHook, ReportConfig, ReportEntry};
pub use run_metadata::{RunMetadata, RunMetadataConfig, RunMetadataHook};

use crate::adapter::{ComponentContext, ComponentRegistry, Hook};
use crate::config::parse_component_config;
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

fn build_run_metadata(config: &Value, _ctx: &ComponentContext) -> Result<Arc<dyn Hook>> {
    let settings: RunMetadataConfig = parse_component_config("run_metadata", config)?;
    Ok(Arc::new(RunMetadataHook::new(settings)))
}

fn build_post_eval_report(config: &Value, ctx: &ComponentContext) -> Result<Arc<dyn Hook>> {
    let mut settings: ReportConfig = parse_component_config("post_eval_report", config)?;
    settings
        .cache_dir
        .get_or_insert_with(|| ctx.output_dir.join("cache"));
    Ok(Arc::new(PostEvalReportHook::new(settings)))
}

pub(crate) fn register_builtins(registry: &mut ComponentRegistry) {
    registry.insert_hook("run_metadata", Arc::new(build_run_metadata));
    registry.insert_hook("post_eval_report", Arc::new(build_post_eval_report));
}
