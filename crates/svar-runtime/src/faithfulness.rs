// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

/// How much of the response/context is sent to the scorer.
const SCORE_INPUT_CAP: usize = 500;

/// Scores how well a reply is grounded in the retrieved context.
///
/// Scores are in `[0, 1]`; the supervisor escalates replies scoring strictly
/// below its threshold.
#[async_trait]
pub trait FaithfulnessScorer: Send + Sync {
    async fn score(&self, response: &str, context: &str) -> f32;
}

/// Pass-through scorer: every reply scores 1.0, so the faithfulness gate
/// never escalates.  The default when model scoring is disabled.
#[derive(Default)]
pub struct NullScorer;

#[async_trait]
impl FaithfulnessScorer for NullScorer {
    async fn score(&self, _response: &str, _context: &str) -> f32 {
        1.0
    }
}

/// Model-based scorer calling a sidecar endpoint.
///
/// Sends `"[RESPONSE] <response[:500]> [CONTEXT] <context[:500]>"` and expects
/// `{"score": <float>}`.  Any transport or shape failure falls back to the
/// null scorer's 1.0 so a broken sidecar can never block replies.
pub struct RemoteScorer {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RemoteScorer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("svar/0.3")
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    async fn score_remote(&self, text: &str) -> anyhow::Result<f32> {
        #[derive(Deserialize)]
        struct ScoreResponse {
            score: f32,
        }
        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?;
        let parsed: ScoreResponse = resp.json().await?;
        Ok(parsed.score.clamp(0.0, 1.0))
    }
}

#[async_trait]
impl FaithfulnessScorer for RemoteScorer {
    async fn score(&self, response: &str, context: &str) -> f32 {
        let text = format!(
            "[RESPONSE] {} [CONTEXT] {}",
            truncate_chars(response, SCORE_INPUT_CAP),
            truncate_chars(context, SCORE_INPUT_CAP)
        );
        match self.score_remote(&text).await {
            Ok(score) => score,
            Err(e) => {
                warn!(error = %e, "faithfulness scorer unavailable, passing reply through");
                1.0
            }
        }
    }
}

/// First `max` chars of `s` (UTF-8 safe).
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Fixed-score scorer for tests of the escalation gate.
pub struct FixedScorer(pub f32);

#[async_trait]
impl FaithfulnessScorer for FixedScorer {
    async fn score(&self, _response: &str, _context: &str) -> f32 {
        self.0
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
