// Reasoning token stripping for chat completion responses
// Author: kelexine (https://github.com/kelexine)

use crate::adapter::{AdapterResponse, Interceptor};
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

fn default_start_token() -> String {
    "<think>".to_string()
}

fn default_end_token() -> String {
    "</think>".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReasoningConfig {
    #[serde(default = "default_start_token")]
    pub start_token: String,
    #[serde(default = "default_end_token")]
    pub end_token: String,
    /// Move stripped text into `message.reasoning_content`.
    #[serde(default)]
    pub keep_reasoning: bool,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            start_token: default_start_token(),
            end_token: default_end_token(),
            keep_reasoning: false,
        }
    }
}

/// Result of splitting one message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub content: String,
    pub reasoning: Option<String>,
}

pub struct ReasoningInterceptor {
    config: ReasoningConfig,
    span: Regex,
    stripped: AtomicU64,
}

impl ReasoningInterceptor {
    pub fn new(config: ReasoningConfig) -> Result<Self> {
        if config.end_token.is_empty() {
            return Err(AdapterError::config("reasoning: end_token must not be empty"));
        }
        let pattern = format!(
            "(?s){}(.*?){}",
            regex::escape(&config.start_token),
            regex::escape(&config.end_token)
        );
        let span = Regex::new(&pattern)
            .map_err(|e| AdapterError::config(format!("reasoning: {}", e)))?;

        Ok(Self {
            config,
            span,
            stripped: AtomicU64::new(0),
        })
    }

    /// Separate reasoning spans from the visible answer.
    pub fn split(&self, text: &str) -> Split {
        let mut reasoning = Vec::new();

        let content = if self.span.is_match(text) {
            for caps in self.span.captures_iter(text) {
                reasoning.push(caps[1].trim().to_string());
            }
            self.span.replace_all(text, "").into_owned()
        } else if let Some(pos) = text.find(&self.config.end_token) {
            // The start token was consumed by the chat template.
            reasoning.push(text[..pos].trim().to_string());
            text[pos + self.config.end_token.len()..].to_string()
        } else {
            return Split {
                content: text.to_string(),
                reasoning: None,
            };
        };

        Split {
            content: content.trim().to_string(),
            reasoning: Some(reasoning.join("\n")),
        }
    }

    /// Rewrite every `choices[].message.content`. Returns whether anything changed.
    pub fn strip_body(&self, body: &mut Value) -> bool {
        let Some(choices) = body.get_mut("choices").and_then(Value::as_array_mut) else {
            return false;
        };

        let mut changed = false;
        for message in choices
            .iter_mut()
            .filter_map(|c| c.get_mut("message").and_then(Value::as_object_mut))
        {
            let Some(text) = message.get("content").and_then(Value::as_str) else {
                continue;
            };
            let split = self.split(text);
            let Some(reasoning) = split.reasoning else {
                continue;
            };

            message.insert("content".to_string(), Value::String(split.content));
            if self.config.keep_reasoning {
                message.insert("reasoning_content".to_string(), Value::String(reasoning));
            }
            changed = true;
        }
        changed
    }
}

#[async_trait]
impl Interceptor for ReasoningInterceptor {
    fn name(&self) -> &str {
        "reasoning"
    }

    async fn intercept_response(&self, mut response: AdapterResponse) -> Result<AdapterResponse> {
        let Some(mut body) = response.json() else {
            return Ok(response);
        };

        if self.strip_body(&mut body) {
            response.set_json(&body)?;
            self.stripped.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %response.ctx.request_id, "Stripped reasoning from response");
        }
        Ok(response)
    }

    async fn on_shutdown(&self) -> Result<()> {
        info!(
            "Reasoning stripped from {} responses",
            self.stripped.load(Ordering::Relaxed)
        );
        Ok(())
    }
}
