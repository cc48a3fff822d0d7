// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{AdapterError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (highest, applied by the caller)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_string_lossy().to_string(), true),
            None => (Self::default_config_path(), false),
        };

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // An explicitly named file must exist
            .add_source(File::with_name(&file).required(required))
            // Override with environment variables (prefix: EVAL_ADAPTER__)
            .add_source(Environment::with_prefix("EVAL_ADAPTER").separator("__"))
            .build()
            .map_err(|e| AdapterError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AdapterError::Config(e.to_string()))
    }

    /// Parse a configuration from an in-memory TOML document layered over defaults.
    pub fn from_toml(document: &str) -> Result<Self> {
        Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AdapterError::Config(e.to_string()))
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".eval-adapter")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}

/// Deserialize a component's free-form settings into its typed form.
///
/// A `null` value (no `config` table given) yields the type's defaults.
pub fn parse_component_config<T>(component: &str, value: &serde_json::Value) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| AdapterError::Config(format!("invalid settings for '{}': {}", component, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_no_components() {
        let config = AppConfig::default();
        assert!(config.adapter.interceptors.is_empty());
        assert!(config.adapter.active_component_names().is_empty());
        assert_eq!(config.server.port, 3825);
    }

    #[test]
    fn test_from_toml_component_lists() {
        let config = AppConfig::from_toml(
            r#"
            [upstream]
            url = "http://localhost:9000/v1/chat/completions"

            [[adapter.interceptors]]
            name = "caching"
            [adapter.interceptors.config]
            cache_dir = "/tmp/cache"
            max_saved_responses = 10

            [[adapter.interceptors]]
            name = "response_stats"
            enabled = false

            [[adapter.post_eval_hooks]]
            name = "post_eval_report"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.url, "http://localhost:9000/v1/chat/completions");
        assert_eq!(config.adapter.interceptors.len(), 2);
        assert_eq!(config.adapter.interceptors[0].config["max_saved_responses"], 10);
        assert!(!config.adapter.interceptors[1].enabled);
        assert_eq!(
            config.adapter.active_component_names(),
            vec!["caching".to_string(), "post_eval_report".to_string()]
        );
    }

    #[derive(Debug, Default, serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[serde(default)]
        limit: u32,
    }

    #[test]
    fn test_parse_component_config_rejects_unknown_options() {
        let ok: Sample = parse_component_config("sample", &serde_json::json!({"limit": 3})).unwrap();
        assert_eq!(ok.limit, 3);

        let defaulted: Sample = parse_component_config("sample", &serde_json::Value::Null).unwrap();
        assert_eq!(defaulted.limit, 0);

        let err = parse_component_config::<Sample>("sample", &serde_json::json!({"limt": 3}));
        assert!(matches!(err, Err(AdapterError::Config(_))));
    }
}
