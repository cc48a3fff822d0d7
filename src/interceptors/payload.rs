// Request payload rewriting
// Author: kelexine (https://github.com/kelexine)

use crate::adapter::{AdapterRequest, Interceptor, RequestOutcome};
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Settings of the `payload_modifier` interceptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayloadConfig {
    /// Top-level parameters merged into every request body.
    #[serde(default)]
    pub params_to_add: Map<String, Value>,
    #[serde(default)]
    pub params_to_remove: Vec<String>,
    /// Old name → new name.
    #[serde(default)]
    pub params_to_rename: BTreeMap<String, String>,
}

pub struct PayloadModifierInterceptor {
    config: PayloadConfig,
}

impl PayloadModifierInterceptor {
    pub fn new(config: PayloadConfig) -> Result<Self> {
        if config.params_to_add.is_empty()
            && config.params_to_remove.is_empty()
            && config.params_to_rename.is_empty()
        {
            return Err(AdapterError::config(
                "payload_modifier: at least one of params_to_add, params_to_remove, params_to_rename is required",
            ));
        }
        Ok(Self { config })
    }

    /// Apply removals, then additions, then renames.
    pub fn apply(&self, body: &mut Value) -> Result<()> {
        let obj = body
            .as_object_mut()
            .ok_or_else(|| AdapterError::InvalidRequest("request body must be a JSON object".into()))?;

        for key in &self.config.params_to_remove {
            obj.remove(key);
        }
        for (key, value) in &self.config.params_to_add {
            obj.insert(key.clone(), value.clone());
        }
        for (from, to) in &self.config.params_to_rename {
            if let Some(value) = obj.remove(from) {
                obj.insert(to.clone(), value);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Interceptor for PayloadModifierInterceptor {
    fn name(&self) -> &str {
        "payload_modifier"
    }

    async fn intercept_request(&self, mut request: AdapterRequest) -> Result<RequestOutcome> {
        self.apply(&mut request.body)?;
        Ok(RequestOutcome::Continue(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remove_add_rename_order() {
        let mut add = Map::new();
        add.insert("max_tokens".to_string(), json!(64));
        add.insert("seed".to_string(), json!(7));
        let interceptor = PayloadModifierInterceptor::new(PayloadConfig {
            params_to_add: add,
            params_to_remove: vec!["max_tokens".into(), "logprobs".into()],
            params_to_rename: BTreeMap::from([("max_tokens".to_string(), "max_completion_tokens".to_string())]),
        })
        .unwrap();

        let mut body = json!({"model": "m", "max_tokens": 1000, "logprobs": true});
        interceptor.apply(&mut body).unwrap();

        assert_eq!(body, json!({"model": "m", "max_completion_tokens": 64, "seed": 7}));
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(PayloadModifierInterceptor::new(PayloadConfig::default())
            .err()
            .unwrap()
            .is_config());
    }

    #[test]
    fn test_non_object_body_is_invalid() {
        let interceptor = PayloadModifierInterceptor::new(PayloadConfig {
            params_to_remove: vec!["x".into()],
            ..Default::default()
        })
        .unwrap();
        let mut body = json!([1, 2]);
        assert!(matches!(
            interceptor.apply(&mut body),
            Err(AdapterError::InvalidRequest(_))
        ));
    }
}
