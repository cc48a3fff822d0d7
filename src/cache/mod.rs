// Response cache module
// Author: kelexine (https://github.com/kelexine)

pub mod diagnostic;
pub mod fingerprint;
mod interceptor;
pub mod models;
pub mod store;

pub use diagnostic::{CacheMissDiagnostic, SimilarRequest};
pub use fingerprint::fingerprint;
pub use interceptor::{CacheInterceptor, SaveLimit, CACHE_HEADER};
pub use models::{CacheExport, CacheStats, CachingConfig, ImportSummary};
pub use store::{CacheStore, Namespace};

use crate::adapter::{ComponentContext, ComponentRegistry, Interceptor};
use crate::config::parse_component_config;
use crate::error::Result;
use std::sync::Arc;

fn build_caching(config: &serde_json::Value, ctx: &ComponentContext) -> Result<Arc<dyn Interceptor>> {
    let mut settings: CachingConfig = parse_component_config("caching", config)?;
    settings
        .cache_dir
        .get_or_insert_with(|| ctx.output_dir.join("cache"));
    Ok(Arc::new(CacheInterceptor::new(settings)?))
}

pub(crate) fn register_builtins(registry: &mut ComponentRegistry) {
    registry.insert_interceptor("caching", Arc::new(build_caching));
}
