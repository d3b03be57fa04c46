// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod prompts;
mod react;
mod registry;
mod runner;

pub use prompts::{persona_for, react_preamble};
pub use react::{parse_react, ReactStep};
pub use registry::AgentRegistry;
pub use runner::{AgentRunner, CANNED_SAFE_REPLY};

use async_trait::async_trait;
use svar_model::Message;

/// The state slice handed to an agent for one turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub messages: Vec<Message>,
    pub session_id: String,
    pub user_id: String,
}

/// What an agent returns: the messages it produced this turn plus the
/// signals the supervisor folds back into session state.
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    pub messages: Vec<Message>,
    /// Concatenation of the retrieved chunks backing the reply.
    pub last_rag_context: String,
    pub resolved: bool,
    pub needs_escalation: bool,
    /// The input guard rejected the message: a canned reply was returned
    /// without touching retrieval or the model.  Not an invocation outcome,
    /// so the circuit breaker must not count it either way.
    pub input_rejected: bool,
}

/// A bounded turn handler for one support domain.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;
    async fn invoke(&self, input: &TurnInput) -> anyhow::Result<AgentOutcome>;
}
