// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One retrieved document chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub score: f32,
}

/// Document retrieval over an external vector store.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Value>,
    ) -> anyhow::Result<Vec<RetrievedChunk>>;
}

/// HTTP retriever: `POST {base}/search` with `{query, top_k, filters?}`.
pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRetriever {
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

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    chunks: Vec<RetrievedChunk>,
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Value>,
    ) -> anyhow::Result<Vec<RetrievedChunk>> {
        let url = format!("{}/search", self.base_url);
        let mut body = serde_json::json!({ "query": query, "top_k": top_k });
        if let Some(f) = filters {
            body["filters"] = f.clone();
        }
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: SearchResponse = resp.json().await.context("decoding search response")?;
        debug!(query, returned = parsed.chunks.len(), "vector search");
        Ok(parsed.chunks)
    }
}

/// In-memory retriever over a seeded document set.
///
/// Scores by word overlap between query and chunk – deterministic and fast
/// enough for local dev and tests.  Not a vector search.
pub struct StaticRetriever {
    docs: Vec<RetrievedChunk>,
}

impl StaticRetriever {
    pub fn new(docs: Vec<RetrievedChunk>) -> Self {
        Self { docs }
    }

    /// A small product-support corpus for running without a vector backend.
    pub fn with_default_docs() -> Self {
        let docs = [
            (
                "billing/refunds",
                "Refunds are issued to the original payment method within 3-5 business days \
                 after approval. Invoices can be looked up by their INV- identifier.",
            ),
            (
                "billing/payments",
                "We accept card and SEPA payments. A payment failure marks the invoice open \
                 until retried; overdue invoices block refund requests.",
            ),
            (
                "tech/install",
                "Install the desktop client from the downloads page. On Linux, the .deb \
                 package requires glibc 2.31 or newer.",
            ),
            (
                "tech/troubleshooting",
                "If the client fails to start, clear the cache directory and check the log \
                 file under ~/.local/share for error details.",
            ),
            (
                "support/contact",
                "Support is available 24/7 via chat. Complex cases are escalated to a human \
                 agent with a support ticket.",
            ),
        ]
        .into_iter()
        .map(|(source, content)| RetrievedChunk {
            content: content.to_string(),
            source: source.to_string(),
            score: 0.0,
        })
        .collect();
        Self { docs }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        _filters: Option<&Value>,
    ) -> anyhow::Result<Vec<RetrievedChunk>> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        let mut scored: Vec<RetrievedChunk> = self
            .docs
            .iter()
            .map(|d| {
                let haystack = d.content.to_lowercase();
                let hits = query_words.iter().filter(|w| haystack.contains(*w)).count();
                let score = if query_words.is_empty() {
                    0.0
                } else {
                    hits as f32 / query_words.len() as f32
                };
                RetrievedChunk {
                    content: d.content.clone(),
                    source: d.source.clone(),
                    score,
                }
            })
            .filter(|c| c.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
