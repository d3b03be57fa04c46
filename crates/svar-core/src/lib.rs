// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod breaker;
mod checkpoint;
mod error;
mod hitl;
mod limit;
mod router;
mod state;
mod supervisor;
mod transcript;

pub use breaker::{CircuitBreaker, CircuitStatus};
pub use checkpoint::{Checkpointer, MemoryCheckpointer};
pub use error::DispatchError;
pub use hitl::{
    EmailHitlHandler, EscalationContext, HitlHandler, PendingEscalation, StubHitlHandler,
    TicketHitlHandler,
};
pub use limit::AgentLimiter;
pub use router::{RouteDecision, SessionRouter};
pub use state::{EscalationReason, SupervisorState};
pub use supervisor::{Supervisor, TurnRequest, TurnResult, ESCALATION_MESSAGE, FAILURE_MESSAGE};
pub use transcript::{ConversationStore, MemoryConversationStore, TurnRecord};
