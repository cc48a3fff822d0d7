//! Third-party component discovery.
//!
//! Two sources populate the [`ComponentRegistry`] before the pipeline is
//! built:
//!
//! - **modules**: named registration entry points compiled into the binary
//!   (or added by an embedding application) in a [`ModuleCatalog`].
//! - **dirs**: directories of `*.toml` component manifests, each declaring a
//!   new component name as a preset of an existing one:
//!
//! ```toml
//! name = "strict_cache"
//! base = "caching"
//! kind = "interceptor"
//!
//! [defaults]
//! reuse_cached_responses = true
//! test_mode = true
//! ```
//!
//! Author: kelexine (<https://github.com/kelexine>)

use super::registry::ComponentRegistry;
use crate::config::DiscoveryConfig;
use crate::error::{AdapterError, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Registration entry point of a component module.
pub type RegisterFn = fn(&mut ComponentRegistry) -> Result<()>;

/// Named registration entry points available to `discovery.modules`.
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, RegisterFn>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue with the modules that ship with the adapter.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.add("eval_presets", register_eval_presets);
        catalog
    }

    pub fn add(&mut self, name: &str, register: RegisterFn) {
        self.modules.insert(name.to_string(), register);
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

/// Presets commonly used when re-running evaluations against a warm cache.
fn register_eval_presets(registry: &mut ComponentRegistry) -> Result<()> {
    registry.register_interceptor_preset(
        "strict_cache",
        "caching",
        json!({ "reuse_cached_responses": true, "test_mode": true }),
    )?;
    registry.register_interceptor_preset(
        "replay_cache",
        "caching",
        json!({ "reuse_cached_responses": true, "save_requests": false }),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    #[default]
    Interceptor,
    Hook,
}

/// A `*.toml` file found in a discovery directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentManifest {
    pub name: String,
    pub base: String,
    #[serde(default)]
    pub kind: ComponentKind,
    #[serde(default)]
    pub defaults: toml::Table,
}

impl ComponentManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::config(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        toml::from_str(&text).map_err(|e| {
            AdapterError::config(format!("invalid manifest {}: {}", path.display(), e))
        })
    }

    pub fn register(&self, registry: &mut ComponentRegistry) -> Result<()> {
        let defaults = serde_json::to_value(&self.defaults)?;
        match self.kind {
            ComponentKind::Interceptor => {
                registry.register_interceptor_preset(&self.name, &self.base, defaults)
            }
            ComponentKind::Hook => registry.register_hook_preset(&self.name, &self.base, defaults),
        }
    }
}

/// Load every configured module and manifest directory into `registry`.
pub fn discover(
    registry: &mut ComponentRegistry,
    config: &DiscoveryConfig,
    catalog: &ModuleCatalog,
) -> Result<()> {
    for module in &config.modules {
        let register = catalog.modules.get(module).ok_or_else(|| {
            AdapterError::config(format!(
                "unknown component module '{}' (available: {})",
                module,
                catalog.names().join(", ")
            ))
        })?;
        register(registry)?;
        info!("Loaded component module '{}'", module);
    }

    for dir in &config.dirs {
        let mut manifests = std::fs::read_dir(dir)
            .map_err(|e| {
                AdapterError::config(format!("cannot scan discovery dir {}: {}", dir.display(), e))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "toml"))
            .collect::<Vec<_>>();
        manifests.sort();

        for path in manifests {
            let manifest = ComponentManifest::from_file(&path)?;
            manifest.register(registry)?;
            info!(
                "Registered '{}' from {} (based on '{}')",
                manifest.name,
                path.display(),
                manifest.base
            );
        }
    }

    Ok(())
}
