// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use rand::RngCore;
use tracing::debug;

use svar_runtime::IntentClassifier;

/// Session assignment plus routing suggestion for one incoming message.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub session_id: String,
    /// Ordered candidate agent ids from the intent classifier.  Entries past
    /// the first are fallbacks consulted only when route-time filtering
    /// removes earlier ones.
    pub suggested_agent_ids: Vec<String>,
}

/// Accepts or mints session ids and runs the intent classifier.
pub struct SessionRouter {
    classifier: Arc<dyn IntentClassifier>,
}

impl SessionRouter {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    pub async fn route(
        &self,
        user_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> RouteDecision {
        let session_id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => new_session_id(),
        };
        let suggested_agent_ids = self.classifier.classify(message).await;
        debug!(user_id, %session_id, ?suggested_agent_ids, "routed message");
        RouteDecision {
            session_id,
            suggested_agent_ids,
        }
    }
}

/// 32 lowercase hex chars from 16 CSPRNG bytes.
fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
