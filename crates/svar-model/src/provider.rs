// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse};

/// A chat-completion backend.
///
/// One call = one completed model turn: the returned response carries the
/// assistant text and any tool calls the model requested.  Implementations
/// own their transport concerns (timeouts, retry-on-timeout) so callers can
/// treat `chat` as a single suspension point.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return the finished turn.
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse>;
}
