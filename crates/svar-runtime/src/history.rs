// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use svar_model::{Message, Role};

/// Format the last `n` user/assistant messages as role-prefixed lines for
/// in-prompt short-term memory:
///
/// ```text
/// User: my payment failed
/// Agent: let me check that for you
/// ```
///
/// System and tool messages are skipped – they are plumbing, not
/// conversation.  Assistant messages that only carry tool calls (empty
/// content) are skipped for the same reason.
pub fn format_recent(messages: &[Message], n: usize) -> String {
    let lines: Vec<String> = messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .filter_map(|m| match m.role {
            Role::User => Some(format!("User: {}", m.content)),
            Role::Assistant => Some(format!("Agent: {}", m.content)),
            Role::System | Role::Tool => None,
        })
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
