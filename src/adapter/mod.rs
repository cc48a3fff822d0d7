//! The adapter pipeline: interceptor chain, lifecycle hooks, and the
//! registry that turns configuration into running components.
//!
//! # Components
//!
//! - `types`: request/response envelopes and the `Interceptor`/`Hook` traits.
//! - `pipeline`: ordered execution of one call through the chain.
//! - `registry`: name → constructor table and pipeline assembly.
//! - `discovery`: loading extra components from modules and manifest dirs.
//! - `upstream`: the real model endpoint.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod discovery;
mod pipeline;
mod registry;
mod types;
mod upstream;

pub use discovery::{discover, ModuleCatalog};
pub use pipeline::AdapterPipeline;
pub use registry::{build_pipeline, ComponentContext, ComponentRegistry, HookFactory, InterceptorFactory};
pub use types::{
    headers_to_map, map_to_headers, AdapterRequest, AdapterResponse, Hook, HookContext, Interceptor,
    RequestContext, RequestOutcome,
};
pub use upstream::{build_http_client, HttpUpstream, Upstream};
