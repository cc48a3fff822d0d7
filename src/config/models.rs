//! Configuration data structures for the evaluation adapter.
//!
//! This module defines the schema for the application settings: the
//! inbound server, the upstream model endpoint, logging, and the adapter
//! pipeline itself (interceptors, lifecycle hooks, component discovery).
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port).
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream model endpoint settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Interceptor chain, hooks and discovery.
    #[serde(default)]
    pub adapter: AdapterConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `3825`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body in bytes.
    /// Default: `50 MiB`
    #[serde(default = "default_body_limit")]
    pub max_body_bytes: usize,
}

/// Settings for the real model endpoint the adapter forwards to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL of the upstream endpoint, e.g. an OpenAI-compatible
    /// `/v1/chat/completions` route.
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Connect timeout in seconds. The request itself has no timeout;
    /// the harness owns cancellation.
    /// Default: `10`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Description of the adapter pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Directory that receives metrics, reports and run metadata.
    /// Default: `./adapter_output`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Interceptors, in request/response execution order.
    #[serde(default)]
    pub interceptors: Vec<ComponentConfig>,

    /// Hooks run once before the first call is accepted.
    #[serde(default)]
    pub pre_eval_hooks: Vec<ComponentConfig>,

    /// Hooks run once after the last call has completed.
    #[serde(default)]
    pub post_eval_hooks: Vec<ComponentConfig>,

    /// Extra component sources scanned before the pipeline is built.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// One entry of the interceptor or hook lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Registry name of the component.
    pub name: String,

    /// Disabled components are skipped entirely.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Component-specific settings, validated by the component itself.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            config,
        }
    }
}

/// Third-party component sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoveryConfig {
    /// Names of compiled-in registration modules to load.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Directories scanned for `*.toml` component manifests.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_body_limit(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            interceptors: Vec::new(),
            pre_eval_hooks: Vec::new(),
            post_eval_hooks: Vec::new(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Names of every enabled interceptor and hook, in configured order.
    pub fn active_component_names(&self) -> Vec<String> {
        self.interceptors
            .iter()
            .chain(self.pre_eval_hooks.iter())
            .chain(self.post_eval_hooks.iter())
            .filter(|c| c.enabled)
            .map(|c| c.name.clone())
            .collect()
    }
}

// Helper functions for serde defaults
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3825
}

fn default_body_limit() -> usize {
    50 * 1024 * 1024
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:8000/v1/chat/completions".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

pub(crate) fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./adapter_output")
}
