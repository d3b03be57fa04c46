// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::DispatchError;

/// Per-agent admission control: `max_concurrent` in-flight turns plus a
/// bounded wait queue.  A turn arriving with the queue full fails fast with
/// [`DispatchError::Overload`] instead of piling up latency.
pub struct AgentLimiter {
    agent_id: String,
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
    queue_len: usize,
}

impl AgentLimiter {
    pub fn new(agent_id: impl Into<String>, max_concurrent: usize, queue_len: usize) -> Self {
        Self {
            agent_id: agent_id.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            waiting: AtomicUsize::new(0),
            queue_len,
        }
    }

    /// Acquire an execution slot, waiting in the bounded queue if necessary.
    /// The permit releases the slot on drop.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, DispatchError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => {
                // Claim a queue slot before blocking; release it either way.
                let waiters = self.waiting.fetch_add(1, Ordering::SeqCst);
                if waiters >= self.queue_len {
                    self.waiting.fetch_sub(1, Ordering::SeqCst);
                    return Err(DispatchError::Overload(self.agent_id.clone()));
                }
                let result = self.semaphore.clone().acquire_owned().await;
                self.waiting.fetch_sub(1, Ordering::SeqCst);
                result.map_err(|_| DispatchError::Overload(self.agent_id.clone()))
            }
            Err(TryAcquireError::Closed) => Err(DispatchError::Overload(self.agent_id.clone())),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
