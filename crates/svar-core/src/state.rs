// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

use svar_model::Message;

/// Why a turn is being handed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    #[default]
    None,
    LowFaithfulness,
    AgentRequested,
    InvocationFailed,
}

/// The single checkpointed entity: everything the supervisor knows about one
/// session.
///
/// `messages` is bounded (the checkpointer stores only the most recent
/// window); the full transcript lives in the conversation store, which is
/// written by the frontend, not by supervisor nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorState {
    pub messages: Vec<Message>,
    pub session_id: String,
    pub user_id: String,
    /// Router suggestions for the current turn only.
    #[serde(default)]
    pub suggested_agent_ids: Vec<String>,
    /// Planner choice for the current turn, or empty.
    #[serde(default)]
    pub planned_agent_ids: Vec<String>,
    /// Agent selected by the route node, or empty.
    #[serde(default)]
    pub current_agent: String,
    /// Retrieved context backing the most recent invocation this turn.
    #[serde(default)]
    pub last_rag_context: String,
    #[serde(default)]
    pub needs_escalation: bool,
    #[serde(default)]
    pub escalation_reason: EscalationReason,
    /// Heuristic, informational only.
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl SupervisorState {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            suggested_agent_ids: Vec::new(),
            planned_agent_ids: Vec::new(),
            current_agent: String::new(),
            last_rag_context: String::new(),
            needs_escalation: false,
            escalation_reason: EscalationReason::None,
            resolved: false,
            metadata: serde_json::Map::new(),
        }
    }

    /// Merge a new turn into persisted state: append the user message,
    /// overwrite the router suggestions, and clear every per-turn transient.
    pub fn begin_turn(&mut self, user_message: &str, suggested_agent_ids: Vec<String>) {
        self.messages.push(Message::user(user_message));
        self.suggested_agent_ids = suggested_agent_ids;
        self.planned_agent_ids.clear();
        self.current_agent.clear();
        self.last_rag_context.clear();
        self.needs_escalation = false;
        self.escalation_reason = EscalationReason::None;
        self.resolved = false;
    }

    /// Keep only the last `n` messages (checkpoint bound).
    pub fn truncate_messages(&mut self, n: usize) {
        if self.messages.len() > n {
            self.messages.drain(..self.messages.len() - n);
        }
    }

    /// The text of the most recent assistant message with content, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        svar_model::last_assistant_text(&self.messages)
    }

    /// The text of the most recent user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        svar_model::last_user_text(&self.messages)
    }

    /// Mark the turn for escalation without ever downgrading an existing
    /// escalation reason.
    pub fn escalate(&mut self, reason: EscalationReason) {
        self.needs_escalation = true;
        if self.escalation_reason == EscalationReason::None {
            self.escalation_reason = reason;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
