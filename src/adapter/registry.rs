// Component registry - maps configured names to constructors
// Author: kelexine (https://github.com/kelexine)

use super::pipeline::AdapterPipeline;
use super::types::{Hook, Interceptor};
use super::upstream::Upstream;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a component constructor may need besides its own settings.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    pub output_dir: PathBuf,
    pub http_client: Client,
}

pub type InterceptorFactory =
    Arc<dyn Fn(&serde_json::Value, &ComponentContext) -> Result<Arc<dyn Interceptor>> + Send + Sync>;

pub type HookFactory =
    Arc<dyn Fn(&serde_json::Value, &ComponentContext) -> Result<Arc<dyn Hook>> + Send + Sync>;

/// Name → constructor table for interceptors and hooks.
///
/// Built explicitly at startup; there is no global instance.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    interceptors: BTreeMap<String, InterceptorFactory>,
    hooks: BTreeMap<String, HookFactory>,
}

impl ComponentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every component shipped with the adapter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::interceptors::register_builtins(&mut registry);
        crate::cache::register_builtins(&mut registry);
        crate::hooks::register_builtins(&mut registry);
        registry
    }

    /// Register an interceptor constructor. Names must be unique.
    pub fn register_interceptor<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&serde_json::Value, &ComponentContext) -> Result<Arc<dyn Interceptor>>
            + Send
            + Sync
            + 'static,
    {
        if self.interceptors.contains_key(name) {
            return Err(AdapterError::config(format!(
                "interceptor '{}' is already registered",
                name
            )));
        }
        self.insert_interceptor(name, Arc::new(factory));
        Ok(())
    }

    /// Register a hook constructor. Names must be unique.
    pub fn register_hook<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&serde_json::Value, &ComponentContext) -> Result<Arc<dyn Hook>> + Send + Sync + 'static,
    {
        if self.hooks.contains_key(name) {
            return Err(AdapterError::config(format!("hook '{}' is already registered", name)));
        }
        self.insert_hook(name, Arc::new(factory));
        Ok(())
    }

    pub(crate) fn insert_interceptor(&mut self, name: &str, factory: InterceptorFactory) {
        debug!("Registered interceptor '{}'", name);
        self.interceptors.insert(name.to_string(), factory);
    }

    pub(crate) fn insert_hook(&mut self, name: &str, factory: HookFactory) {
        debug!("Registered hook '{}'", name);
        self.hooks.insert(name.to_string(), factory);
    }

    /// Register `name` as `base` with default settings layered underneath the
    /// settings given at each use.
    pub fn register_interceptor_preset(
        &mut self,
        name: &str,
        base: &str,
        defaults: serde_json::Value,
    ) -> Result<()> {
        let base_factory = self.interceptors.get(base).cloned().ok_or_else(|| {
            AdapterError::config(format!("preset '{}' refers to unknown interceptor '{}'", name, base))
        })?;
        self.register_interceptor(name, move |config, ctx| {
            base_factory(&merge_settings(&defaults, config), ctx)
        })
    }

    /// Hook counterpart of [`register_interceptor_preset`](Self::register_interceptor_preset).
    pub fn register_hook_preset(
        &mut self,
        name: &str,
        base: &str,
        defaults: serde_json::Value,
    ) -> Result<()> {
        let base_factory = self.hooks.get(base).cloned().ok_or_else(|| {
            AdapterError::config(format!("preset '{}' refers to unknown hook '{}'", name, base))
        })?;
        self.register_hook(name, move |config, ctx| {
            base_factory(&merge_settings(&defaults, config), ctx)
        })
    }

    pub fn build_interceptor(
        &self,
        name: &str,
        config: &serde_json::Value,
        ctx: &ComponentContext,
    ) -> Result<Arc<dyn Interceptor>> {
        let factory = self
            .interceptors
            .get(name)
            .ok_or_else(|| AdapterError::config(format!("unknown interceptor '{}'", name)))?;
        factory(config, ctx)
    }

    pub fn build_hook(
        &self,
        name: &str,
        config: &serde_json::Value,
        ctx: &ComponentContext,
    ) -> Result<Arc<dyn Hook>> {
        let factory = self
            .hooks
            .get(name)
            .ok_or_else(|| AdapterError::config(format!("unknown hook '{}'", name)))?;
        factory(config, ctx)
    }

    pub fn interceptor_names(&self) -> Vec<&str> {
        self.interceptors.keys().map(String::as_str).collect()
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.keys().map(String::as_str).collect()
    }
}

/// Shallow merge: keys in `overrides` win over `defaults`.
fn merge_settings(defaults: &serde_json::Value, overrides: &serde_json::Value) -> serde_json::Value {
    match (defaults, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(extra)) => {
            let mut merged = base.clone();
            for (k, v) in extra {
                merged.insert(k.clone(), v.clone());
            }
            serde_json::Value::Object(merged)
        }
        (_, serde_json::Value::Null) => defaults.clone(),
        _ => overrides.clone(),
    }
}

/// Instantiate every enabled component of `config`, in configured order.
pub fn build_pipeline(
    config: &AdapterConfig,
    registry: &ComponentRegistry,
    upstream: Arc<dyn Upstream>,
    http_client: Client,
) -> Result<AdapterPipeline> {
    let ctx = ComponentContext {
        output_dir: config.output_dir.clone(),
        http_client,
    };

    let interceptors = config
        .interceptors
        .iter()
        .filter(|c| c.enabled)
        .map(|c| registry.build_interceptor(&c.name, &c.config, &ctx))
        .collect::<Result<Vec<_>>>()?;

    let build_hooks = |entries: &[crate::config::ComponentConfig]| {
        entries
            .iter()
            .filter(|c| c.enabled)
            .map(|c| registry.build_hook(&c.name, &c.config, &ctx))
            .collect::<Result<Vec<_>>>()
    };
    let pre_eval_hooks = build_hooks(&config.pre_eval_hooks)?;
    let post_eval_hooks = build_hooks(&config.post_eval_hooks)?;

    info!(
        "Built pipeline: {} interceptor(s), {} pre-eval hook(s), {} post-eval hook(s)",
        interceptors.len(),
        pre_eval_hooks.len(),
        post_eval_hooks.len()
    );

    AdapterPipeline::new(
        interceptors,
        pre_eval_hooks,
        post_eval_hooks,
        upstream,
        config.output_dir.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Named(String);

    #[async_trait]
    impl Interceptor for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = ComponentRegistry::with_builtins();
        let names = registry.interceptor_names();
        for expected in [
            "caching",
            "response_stats",
            "progress_tracking",
            "reasoning",
            "payload_modifier",
            "system_message",
            "request_logging",
            "response_logging",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert_eq!(registry.hook_names(), vec!["post_eval_report", "run_metadata"]);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ComponentRegistry::new();
        let factory = |_: &serde_json::Value, _: &ComponentContext| -> Result<Arc<dyn Interceptor>> {
            Ok(Arc::new(Named("x".to_string())))
        };
        registry.register_interceptor("x", factory).unwrap();
        assert!(registry.register_interceptor("x", factory).is_err());
    }

    #[test]
    fn test_preset_merges_defaults_under_overrides() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_interceptor("echo", |config, _| {
                let label = config["label"].as_str().unwrap_or("none").to_string();
                Ok(Arc::new(Named(label)) as Arc<dyn Interceptor>)
            })
            .unwrap();
        registry
            .register_interceptor_preset("loud_echo", "echo", json!({"label": "LOUD"}))
            .unwrap();

        let ctx = ComponentContext {
            output_dir: PathBuf::from("."),
            http_client: Client::new(),
        };
        let default = registry
            .build_interceptor("loud_echo", &serde_json::Value::Null, &ctx)
            .unwrap();
        assert_eq!(default.name(), "LOUD");

        let overridden = registry
            .build_interceptor("loud_echo", &json!({"label": "quiet"}), &ctx)
            .unwrap();
        assert_eq!(overridden.name(), "quiet");

        assert!(registry
            .register_interceptor_preset("ghost", "missing", json!({}))
            .is_err());
    }

    #[test]
    fn test_unknown_component_is_config_error() {
        let registry = ComponentRegistry::new();
        let ctx = ComponentContext {
            output_dir: PathBuf::from("."),
            http_client: Client::new(),
        };
        let err = registry
            .build_interceptor("nope", &serde_json::Value::Null, &ctx)
            .err()
            .unwrap();
        assert!(err.is_config());
    }
}
