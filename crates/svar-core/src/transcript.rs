// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One saved turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Append-only per-session transcript for read APIs.
///
/// Only the frontend writes here – one user turn and one assistant turn per
/// request, after the supervisor returns.  Supervisor nodes never touch it.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_turn(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> anyhow::Result<()>;

    /// The session's turns in append order; with `limit`, only the last
    /// `limit` turns.
    async fn get_history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<TurnRecord>>;

    /// Known session ids, oldest first; with `limit`, only the most recent.
    async fn list_sessions(&self, limit: Option<usize>) -> anyhow::Result<Vec<String>>;
}

#[derive(Default)]
struct StoreInner {
    turns: HashMap<String, Vec<TurnRecord>>,
    /// Session ids in order of first appearance.
    order: Vec<String>,
}

/// In-memory conversation store.
#[derive(Default)]
pub struct MemoryConversationStore {
    inner: Mutex<StoreInner>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append_turn(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.turns.contains_key(session_id) {
            inner.order.push(session_id.to_string());
        }
        inner
            .turns
            .entry(session_id.to_string())
            .or_default()
            .push(TurnRecord {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                role: role.to_string(),
                content: content.to_string(),
                metadata,
            });
        Ok(())
    }

    async fn get_history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<TurnRecord>> {
        let inner = self.inner.lock().await;
        let turns = inner.turns.get(session_id).cloned().unwrap_or_default();
        Ok(match limit {
            Some(n) => turns[turns.len().saturating_sub(n)..].to_vec(),
            None => turns,
        })
    }

    async fn list_sessions(&self, limit: Option<usize>) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let ids = &inner.order;
        Ok(match limit {
            Some(n) => ids[ids.len().saturating_sub(n)..].to_vec(),
            None => ids.clone(),
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
