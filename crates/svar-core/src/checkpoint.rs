// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::SupervisorState;

/// Keyed persistent store of supervisor state, one entry per session.
///
/// The in-memory implementation is the default; a durable backend plugs in
/// behind the same trait.  Callers serialize turns per thread id themselves
/// (the supervisor holds a per-session lock for the whole turn), so
/// implementations only need individual operations to be atomic.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn get(&self, thread_id: &str) -> anyhow::Result<Option<SupervisorState>>;
    async fn put(&self, thread_id: &str, state: SupervisorState) -> anyhow::Result<()>;
    async fn delete(&self, thread_id: &str) -> anyhow::Result<bool>;
}

struct Entry {
    state: SupervisorState,
    saved_at: Instant,
}

/// In-memory checkpointer with lazy TTL expiry.
pub struct MemoryCheckpointer {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryCheckpointer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn get(&self, thread_id: &str) -> anyhow::Result<Option<SupervisorState>> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(thread_id) {
            if entry.saved_at.elapsed() >= self.ttl {
                debug!(thread_id, "checkpoint expired, dropping");
                entries.remove(thread_id);
                return Ok(None);
            }
            return Ok(Some(entry.state.clone()));
        }
        Ok(None)
    }

    async fn put(&self, thread_id: &str, state: SupervisorState) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            thread_id.to_string(),
            Entry {
                state,
                saved_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(thread_id).is_some())
    }
}

/// Checkpointer whose every operation fails.  Exercises the degraded-mode
/// path (turn proceeds on in-memory state, health reports degraded).
#[cfg(test)]
pub struct FailingCheckpointer;

#[cfg(test)]
#[async_trait]
impl Checkpointer for FailingCheckpointer {
    async fn get(&self, _thread_id: &str) -> anyhow::Result<Option<SupervisorState>> {
        anyhow::bail!("checkpoint backend unavailable")
    }
    async fn put(&self, _thread_id: &str, _state: SupervisorState) -> anyhow::Result<()> {
        anyhow::bail!("checkpoint backend unavailable")
    }
    async fn delete(&self, _thread_id: &str) -> anyhow::Result<bool> {
        anyhow::bail!("checkpoint backend unavailable")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
