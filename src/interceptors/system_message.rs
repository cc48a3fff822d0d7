// System prompt injection for chat requests
// Author: kelexine (https://github.com/kelexine)

use crate::adapter::{AdapterRequest, Interceptor, RequestOutcome};
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// What to do with a system message the harness already sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Drop the existing system message.
    #[default]
    Replace,
    /// Configured text goes before the existing text.
    Prepend,
    /// Configured text goes after the existing text.
    Append,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemMessageConfig {
    pub system_message: String,
    #[serde(default)]
    pub strategy: Strategy,
}

pub struct SystemMessageInterceptor {
    config: SystemMessageConfig,
}

impl SystemMessageInterceptor {
    pub fn new(config: SystemMessageConfig) -> Result<Self> {
        if config.system_message.is_empty() {
            return Err(AdapterError::config("system_message: system_message must not be empty"));
        }
        Ok(Self { config })
    }

    fn merged(&self, existing: &str) -> String {
        let configured = &self.config.system_message;
        match self.config.strategy {
            Strategy::Replace => configured.clone(),
            Strategy::Prepend => format!("{}\n{}", configured, existing),
            Strategy::Append => format!("{}\n{}", existing, configured),
        }
    }

    /// Leave exactly one system message at the head of `messages`.
    pub fn apply(&self, body: &mut Value) {
        let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
            debug!("Request has no messages array; system message not applied");
            return;
        };

        let is_system = |m: &Value| m.get("role").and_then(Value::as_str) == Some("system");
        let existing: Vec<String> = messages
            .iter()
            .filter(|m| is_system(*m))
            .filter_map(|m| m.get("content").and_then(Value::as_str).map(str::to_string))
            .collect();
        messages.retain(|m| !is_system(m));

        let content = if existing.is_empty() {
            self.config.system_message.clone()
        } else {
            self.merged(&existing.join("\n"))
        };
        messages.insert(0, json!({"role": "system", "content": content}));
    }
}

#[async_trait]
impl Interceptor for SystemMessageInterceptor {
    fn name(&self) -> &str {
        "system_message"
    }

    async fn intercept_request(&self, mut request: AdapterRequest) -> Result<RequestOutcome> {
        self.apply(&mut request.body);
        Ok(RequestOutcome::Continue(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(strategy: Strategy) -> SystemMessageInterceptor {
        SystemMessageInterceptor::new(SystemMessageConfig {
            system_message: "Be brief.".to_string(),
            strategy,
        })
        .unwrap()
    }

    fn body() -> Value {
        json!({"messages": [
            {"role": "system", "content": "You are helpful."},
            {"role": "user", "content": "hi"}
        ]})
    }

    #[test]
    fn test_replace() {
        let mut b = body();
        with(Strategy::Replace).apply(&mut b);
        assert_eq!(b["messages"][0]["content"], "Be brief.");
        assert_eq!(b["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_prepend_and_append() {
        let mut b = body();
        with(Strategy::Prepend).apply(&mut b);
        assert_eq!(b["messages"][0]["content"], "Be brief.\nYou are helpful.");

        let mut b = body();
        with(Strategy::Append).apply(&mut b);
        assert_eq!(b["messages"][0]["content"], "You are helpful.\nBe brief.");
    }

    #[test]
    fn test_inserts_when_absent() {
        let mut b = json!({"messages": [{"role": "user", "content": "hi"}]});
        with(Strategy::Append).apply(&mut b);
        assert_eq!(b["messages"][0], json!({"role": "system", "content": "Be brief."}));
        assert_eq!(b["messages"][1]["role"], "user");
    }

    #[test]
    fn test_strategy_parses_lowercase() {
        let config: SystemMessageConfig =
            serde_json::from_value(json!({"system_message": "x", "strategy": "prepend"})).unwrap();
        assert_eq!(config.strategy, Strategy::Prepend);
    }
}
