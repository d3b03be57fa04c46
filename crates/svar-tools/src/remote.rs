// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Client side of the external tool server.
//!
//! The tool server is a required collaborator: its tools are enumerated once
//! at startup and merged into each agent's registry.  Enumeration retries a
//! few times with a flat back-off and then fails startup – a dispatcher
//! without its external tools is misconfigured, not degraded.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{Tool, ToolCall, ToolOutput};

/// Descriptor of one tool as advertised by the tool server.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the tool's argument object.
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

/// Transport to the external tool server.
#[async_trait]
pub trait ToolServerClient: Send + Sync {
    /// Enumerate the tools the server offers.
    async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolDescriptor>>;

    /// Invoke one tool with a JSON argument object; returns the textual
    /// result (structured results are JSON-encoded).
    async fn call_tool(&self, name: &str, args: &Value) -> anyhow::Result<String>;

    /// Liveness probe used by the health endpoint.
    async fn ping(&self) -> bool {
        self.list_tools().await.is_ok()
    }
}

/// HTTP implementation: `GET {base}/tools` to enumerate,
/// `POST {base}/tools/{name}` to invoke.
pub struct HttpToolServerClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpToolServerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("svar/0.3")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ToolServerClient for HttpToolServerClient {
    async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolDescriptor>> {
        let url = format!("{}/tools", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        resp.json::<Vec<RemoteToolDescriptor>>()
            .await
            .context("decoding tool list")
    }

    async fn call_tool(&self, name: &str, args: &Value) -> anyhow::Result<String> {
        let url = format!("{}/tools/{}", self.base_url, name);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(args)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await.context("decoding tool result")?;
        // `{"content": ...}` envelope; a bare body is accepted as-is.
        let content = body.get("content").unwrap_or(&body);
        Ok(match content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A locally registered tool backed by the tool server.
pub struct RemoteTool {
    descriptor: RemoteToolDescriptor,
    client: Arc<dyn ToolServerClient>,
}

impl RemoteTool {
    pub fn new(descriptor: RemoteToolDescriptor, client: Arc<dyn ToolServerClient>) -> Self {
        Self { descriptor, client }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.client.call_tool(&self.descriptor.name, &call.args).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => ToolOutput::err(&call.id, format!("tool server error: {e:#}")),
        }
    }
}

/// Number of enumeration attempts before startup fails.
const DISCOVERY_ATTEMPTS: u32 = 3;
/// Flat back-off between attempts.
const DISCOVERY_BACKOFF: Duration = Duration::from_secs(2);

/// Enumerate the tool server and wrap each descriptor as a [`RemoteTool`].
///
/// Retries [`DISCOVERY_ATTEMPTS`] times with [`DISCOVERY_BACKOFF`] between
/// attempts; persistent failure is a startup error.
pub async fn discover_external_tools(
    client: &Arc<dyn ToolServerClient>,
) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
    let mut last_err = None;
    for attempt in 1..=DISCOVERY_ATTEMPTS {
        match client.list_tools().await {
            Ok(descriptors) => {
                info!(count = descriptors.len(), "discovered external tools");
                return Ok(descriptors
                    .into_iter()
                    .map(|d| Arc::new(RemoteTool::new(d, Arc::clone(client))) as Arc<dyn Tool>)
                    .collect());
            }
            Err(e) => {
                warn!(attempt, error = %e, "tool server enumeration failed");
                last_err = Some(e);
                if attempt < DISCOVERY_ATTEMPTS {
                    tokio::time::sleep(DISCOVERY_BACKOFF).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("tool server enumeration failed")))
        .context("external tool server unreachable; refusing to start without its tools")
}

/// In-memory tool server for tests: a fixed descriptor list and a canned
/// response per tool name.
pub struct MockToolServer {
    descriptors: Vec<RemoteToolDescriptor>,
    responses: std::collections::HashMap<String, String>,
    /// When true, every operation fails (startup fail-fast tests).
    pub unreachable: std::sync::atomic::AtomicBool,
}

impl MockToolServer {
    pub fn new(tools: Vec<(&str, &str)>) -> Self {
        let descriptors = tools
            .iter()
            .map(|(name, _)| RemoteToolDescriptor {
                name: name.to_string(),
                description: format!("remote tool {name}"),
                input_schema: default_schema(),
            })
            .collect();
        let responses = tools
            .into_iter()
            .map(|(name, reply)| (name.to_string(), reply.to_string()))
            .collect();
        Self {
            descriptors,
            responses,
            unreachable: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ToolServerClient for MockToolServer {
    async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolDescriptor>> {
        if self.unreachable.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(self.descriptors.clone())
    }

    async fn call_tool(&self, name: &str, _args: &Value) -> anyhow::Result<String> {
        if self.unreachable.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        self.responses
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such tool: {name}"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn discovery_wraps_descriptors() {
        let server: Arc<dyn ToolServerClient> =
            Arc::new(MockToolServer::new(vec![("kb_search", "kb result")]));
        let tools = discover_external_tools(&server).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "kb_search");
    }

    #[tokio::test]
    async fn remote_tool_executes_through_client() {
        let server: Arc<dyn ToolServerClient> =
            Arc::new(MockToolServer::new(vec![("kb_search", "kb result")]));
        let tools = discover_external_tools(&server).await.unwrap();
        let out = tools[0]
            .execute(&ToolCall {
                id: "c1".into(),
                name: "kb_search".into(),
                args: json!({"query": "vpn"}),
            })
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "kb result");
    }

    #[tokio::test]
    async fn remote_tool_wraps_transport_error() {
        let server = Arc::new(MockToolServer::new(vec![("kb_search", "x")]));
        let tools = {
            let client: Arc<dyn ToolServerClient> = server.clone();
            discover_external_tools(&client).await.unwrap()
        };
        server
            .unreachable
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let out = tools[0]
            .execute(&ToolCall {
                id: "c1".into(),
                name: "kb_search".into(),
                args: json!({}),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("tool server error"));
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_fails_after_retries() {
        let server = MockToolServer::new(vec![]);
        server
            .unreachable
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let client: Arc<dyn ToolServerClient> = Arc::new(server);
        let err = discover_external_tools(&client).await.unwrap_err();
        assert!(err.to_string().contains("refusing to start"));
    }

    #[tokio::test]
    async fn ping_reflects_reachability() {
        let server = MockToolServer::new(vec![]);
        assert!(server.ping().await);
        server
            .unreachable
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(!server.ping().await);
    }

    #[test]
    fn descriptor_defaults_missing_schema() {
        let d: RemoteToolDescriptor =
            serde_json::from_str(r#"{"name": "bare"}"#).unwrap();
        assert_eq!(d.input_schema, json!({"type": "object"}));
        assert!(d.description.is_empty());
    }
}
