// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Agent id suggested when nothing else matches.
pub const DEFAULT_AGENT: &str = "support";

/// Maps user text to an ordered list of candidate agent ids.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, message: &str) -> Vec<String>;
}

/// Keyword-table classifier.
///
/// Lowercases the input and appends a row's agent id whenever any of the
/// row's keywords occurs as a substring, preserving table order.  No match
/// falls back to `support`.
pub struct KeywordClassifier {
    rows: Vec<(Vec<&'static str>, &'static str)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            rows: vec![
                (
                    vec!["invoice", "bill", "payment", "refund", "billing"],
                    "billing",
                ),
                (
                    vec!["tech", "error", "bug", "install", "troubleshoot"],
                    "tech",
                ),
                (
                    vec!["human", "agent", "escalate", "speak to someone"],
                    "escalation",
                ),
            ],
        }
    }
}

impl KeywordClassifier {
    fn classify_sync(&self, message: &str) -> Vec<String> {
        let lower = message.to_lowercase();
        let mut out: Vec<String> = self
            .rows
            .iter()
            .filter(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(_, agent_id)| agent_id.to_string())
            .collect();
        if out.is_empty() {
            out.push(DEFAULT_AGENT.to_string());
        }
        out
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, message: &str) -> Vec<String> {
        self.classify_sync(message)
    }
}

/// Model-based single-label classifier over the fixed label set
/// {support, billing, tech, escalation}.
///
/// Calls a sidecar endpoint with `{"text": ...}` and expects
/// `{"label": ..., "confidence": ...}`.  The label is used only when it is a
/// known agent id and its confidence reaches the configured threshold;
/// everything else – including any transport failure – falls back to the
/// keyword classifier.
pub struct RemoteIntentClassifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    confidence_threshold: f32,
    fallback: KeywordClassifier,
}

const LABELS: [&str; 4] = ["support", "billing", "tech", "escalation"];

impl RemoteIntentClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration, confidence_threshold: f32) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("svar/0.3")
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            timeout,
            confidence_threshold,
            fallback: KeywordClassifier::default(),
        }
    }

    async fn classify_remote(&self, message: &str) -> anyhow::Result<(String, f32)> {
        #[derive(Deserialize)]
        struct ClassifyResponse {
            label: String,
            confidence: f32,
        }
        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await?
            .error_for_status()?;
        let parsed: ClassifyResponse = resp.json().await?;
        Ok((parsed.label, parsed.confidence))
    }
}

#[async_trait]
impl IntentClassifier for RemoteIntentClassifier {
    async fn classify(&self, message: &str) -> Vec<String> {
        match self.classify_remote(message).await {
            Ok((label, confidence)) => {
                let label = label.to_lowercase();
                if LABELS.contains(&label.as_str()) && confidence >= self.confidence_threshold {
                    debug!(%label, confidence, "intent classified by model");
                    vec![label]
                } else {
                    debug!(%label, confidence, "model intent below threshold, using support");
                    vec![DEFAULT_AGENT.to_string()]
                }
            }
            Err(e) => {
                warn!(error = %e, "intent model unavailable, falling back to keyword table");
                self.fallback.classify_sync(message)
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
