// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ChatProvider, ChatRequest, ChatResponse, Message, Role, ToolCallRequest};

/// Chat provider speaking the OpenAI-compatible `/chat/completions` wire
/// format.  Works against OpenAI itself, vLLM, llama.cpp, LiteLLM, and the
/// various proxy gateways.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    /// Sampling defaults applied when the request does not override them.
    temperature: f32,
    top_p: f32,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        temperature: f32,
        top_p: f32,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("svar/0.3")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            temperature,
            top_p,
            timeout,
        }
    }

    async fn chat_once(&self, body: &WireRequest) -> anyhow::Result<WireResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).timeout(self.timeout).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat backend returned {status}: {text}");
        }
        resp.json::<WireResponse>()
            .await
            .context("decoding chat completion response")
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let model = if req.model.is_empty() {
            self.model.clone()
        } else {
            req.model.clone()
        };
        let body = WireRequest {
            model,
            messages: req.messages.iter().map(WireMessage::from).collect(),
            tools: req
                .tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireFunctionDef {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            temperature: req.temperature.unwrap_or(self.temperature),
            top_p: req.top_p.unwrap_or(self.top_p),
        };

        // One retry on timeout only; other failures propagate immediately.
        let wire = match self.chat_once(&body).await {
            Ok(w) => w,
            Err(e) => {
                let timed_out = e
                    .downcast_ref::<reqwest::Error>()
                    .map(|re| re.is_timeout())
                    .unwrap_or(false);
                if !timed_out {
                    return Err(e).context("chat completion failed");
                }
                warn!(model = %self.model, "chat call timed out, retrying once");
                self.chat_once(&body)
                    .await
                    .context("chat completion failed after timeout retry")?
            }
        };

        let choice = wire
            .choices
            .into_iter()
            .next()
            .context("chat backend returned no choices")?;
        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();
        debug!(
            content_len = choice.message.content.as_deref().map(str::len).unwrap_or(0),
            tool_calls = tool_calls.len(),
            "chat completion received"
        );
        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

// ─── Wire format ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        let role = match m.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        Self {
            role,
            content: m.content.clone(),
            tool_call_id: m.tool_call_id.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| WireToolCall {
                    id: tc.id.clone(),
                    kind: "function",
                    function: WireFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireResponseToolCall>,
}

#[derive(Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireFunctionCall,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
