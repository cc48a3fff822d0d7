// Shared helpers for integration tests
// Author: kelexine (https://github.com/kelexine)

#![allow(dead_code)]

use async_trait::async_trait;
use eval_adapter::adapter::{AdapterRequest, AdapterResponse, Upstream};
use eval_adapter::error::Result;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers every call with a fixed chat completion and counts the calls.
pub struct FakeUpstream {
    pub calls: AtomicUsize,
    pub status: u16,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            status,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn send(&self, request: &AdapterRequest) -> Result<AdapterResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = completion("4", 12, 3);
        Ok(AdapterResponse::new(
            self.status,
            body.to_string(),
            request.ctx.clone(),
        ))
    }
}

pub fn completion(content: &str, prompt_tokens: u64, completion_tokens: u64) -> Value {
    json!({
        "id": "cmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": content}
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
}

pub fn chat(question: &str) -> Value {
    json!({
        "model": "test-model",
        "temperature": 0,
        "messages": [{"role": "user", "content": question}]
    })
}
