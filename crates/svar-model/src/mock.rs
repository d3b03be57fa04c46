// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ChatProvider, ChatRequest, ChatResponse, Role, ToolCallRequest};

/// Deterministic mock provider for tests and offline dev.  Echoes the last
/// user message back as the assistant response.
#[derive(Default)]
pub struct EchoProvider;

#[async_trait]
impl ChatProvider for EchoProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-echo"
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");
        Ok(ChatResponse::text(format!("MOCK: {reply}")))
    }
}

/// A pre-scripted provider.  Each `chat` call pops the next response from the
/// front of the queue, so tests can specify exact sequences – including tool
/// calls – without network access.
pub struct ScriptedProvider {
    replies: Mutex<Vec<ChatResponse>>,
    /// The last `ChatRequest` seen.  Written on each `chat()` call so tests
    /// can inspect what was sent.
    pub last_request: Mutex<Option<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ChatResponse>) -> Self {
        Self {
            replies: Mutex::new(replies),
            last_request: Mutex::new(None),
        }
    }

    /// Convenience: provider that always returns the same text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self::new(vec![ChatResponse::text(r)])
    }

    /// Convenience: one tool call round followed by a text reply.
    pub fn tool_then_text(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCallRequest {
                    id: call_id.into(),
                    name: tool_name.into(),
                    arguments: args_json.into(),
                }],
            },
            ChatResponse::text(final_text),
        ])
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        *self.last_request.lock().unwrap() = Some(req);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            // Last script repeats once exhausted so multi-round loops
            // terminate with a text reply instead of an error.
            Ok(ChatResponse::text("[no more scripts]"))
        } else {
            Ok(replies.remove(0))
        }
    }
}

/// Provider whose every call fails.  Exercises invocation-failure paths
/// (circuit breaker, failover, friendly error reply).
pub struct FailingProvider {
    pub message: String,
}

impl FailingProvider {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChatProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing-mock"
    }
    fn model_name(&self) -> &str {
        "failing-mock-model"
    }

    async fn chat(&self, _req: ChatRequest) -> anyhow::Result<ChatResponse> {
        anyhow::bail!("{}", self.message)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
