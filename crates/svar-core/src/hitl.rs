// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use svar_tools::{ToolCall, ToolRegistry};

use crate::EscalationReason;

/// Everything a human needs to pick up an escalated conversation.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationContext {
    pub session_id: String,
    pub user_id: String,
    pub reason: EscalationReason,
    pub last_user_message: String,
    pub last_agent_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Receives escalation events.  Handlers may create tickets or notify
/// operators; they must never assume their failure aborts the turn – the
/// supervisor logs and continues.
#[async_trait]
pub trait HitlHandler: Send + Sync {
    async fn on_escalate(&self, ctx: &EscalationContext) -> anyhow::Result<()>;
}

/// No-op handler (the default).
#[derive(Default)]
pub struct StubHitlHandler;

#[async_trait]
impl HitlHandler for StubHitlHandler {
    async fn on_escalate(&self, ctx: &EscalationContext) -> anyhow::Result<()> {
        info!(session_id = %ctx.session_id, reason = ?ctx.reason, "escalation (stub handler)");
        Ok(())
    }
}

/// Logs the escalation for an operator mailbox integration to pick up.
/// Actual mail transport is outside this system.
pub struct EmailHitlHandler {
    pub to: Option<String>,
}

impl EmailHitlHandler {
    pub fn new(to: Option<String>) -> Self {
        Self { to }
    }
}

#[async_trait]
impl HitlHandler for EmailHitlHandler {
    async fn on_escalate(&self, ctx: &EscalationContext) -> anyhow::Result<()> {
        info!(
            session_id = %ctx.session_id,
            user_id = %ctx.user_id,
            reason = ?ctx.reason,
            to = self.to.as_deref().unwrap_or("(unconfigured)"),
            last_user_message = %ctx.last_user_message,
            "escalation email notification"
        );
        Ok(())
    }
}

/// An escalation awaiting a human, keyed by session.
#[derive(Debug, Clone, Serialize)]
pub struct PendingEscalation {
    pub session_id: String,
    pub ticket_ref: String,
    pub created_at: DateTime<Utc>,
    pub reason: EscalationReason,
}

/// Creates a support ticket through the registered ticket tool and tracks it
/// until a human clears it.
pub struct TicketHitlHandler {
    tools: Arc<ToolRegistry>,
    ticket_tool: String,
    pending: Mutex<HashMap<String, PendingEscalation>>,
}

impl TicketHitlHandler {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            ticket_tool: "create_support_ticket".into(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Pending escalations, oldest first.
    pub fn list_pending(&self) -> Vec<PendingEscalation> {
        let pending = self.pending.lock().unwrap();
        let mut items: Vec<PendingEscalation> = pending.values().cloned().collect();
        items.sort_by_key(|p| p.created_at);
        items
    }

    /// Remove a pending escalation; returns whether one existed.
    pub fn clear_pending(&self, session_id: &str) -> bool {
        self.pending.lock().unwrap().remove(session_id).is_some()
    }
}

#[async_trait]
impl HitlHandler for TicketHitlHandler {
    async fn on_escalate(&self, ctx: &EscalationContext) -> anyhow::Result<()> {
        let summary = if ctx.last_user_message.is_empty() {
            format!("escalated conversation {}", ctx.session_id)
        } else {
            ctx.last_user_message.clone()
        };
        let call = ToolCall {
            id: format!("hitl-{}", ctx.session_id),
            name: self.ticket_tool.clone(),
            args: serde_json::json!({
                "summary": summary,
                "session_id": ctx.session_id,
            }),
        };
        let output = self.tools.execute(&call).await;
        if output.is_error {
            anyhow::bail!("ticket tool failed: {}", output.content);
        }
        let ticket_ref = parse_ticket_ref(&output.content)
            .ok_or_else(|| anyhow::anyhow!("ticket tool returned no ticket_ref: {}", output.content))?;

        info!(session_id = %ctx.session_id, %ticket_ref, "escalation ticket created");
        self.pending.lock().unwrap().insert(
            ctx.session_id.clone(),
            PendingEscalation {
                session_id: ctx.session_id.clone(),
                ticket_ref,
                created_at: Utc::now(),
                reason: ctx.reason,
            },
        );
        Ok(())
    }
}

/// Extract `ticket_ref` from the ticket tool's JSON output; falls back to the
/// raw content when the output is a bare reference string.
fn parse_ticket_ref(content: &str) -> Option<String> {
    match serde_json::from_str::<Value>(content) {
        Ok(v) => v
            .get("ticket_ref")
            .and_then(|r| r.as_str())
            .map(String::from),
        Err(_) => {
            let trimmed = content.trim();
            if trimmed.starts_with("TCK-") {
                Some(trimmed.to_string())
            } else {
                warn!(content, "unrecognized ticket tool output");
                None
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use svar_tools::default_tools;

    use super::*;

    fn ctx(session: &str) -> EscalationContext {
        EscalationContext {
            session_id: session.into(),
            user_id: "u1".into(),
            reason: EscalationReason::LowFaithfulness,
            last_user_message: "was my payment $999?".into(),
            last_agent_message: "your payment was $100".into(),
            metadata: None,
        }
    }

    fn ticket_handler() -> TicketHitlHandler {
        TicketHitlHandler::new(Arc::new(ToolRegistry::build(default_tools(), vec![])))
    }

    #[tokio::test]
    async fn stub_handler_accepts_everything() {
        assert!(StubHitlHandler.on_escalate(&ctx("s1")).await.is_ok());
    }

    #[tokio::test]
    async fn email_handler_logs_without_error() {
        let h = EmailHitlHandler::new(Some("ops@example.com".into()));
        assert!(h.on_escalate(&ctx("s1")).await.is_ok());
    }

    #[tokio::test]
    async fn ticket_handler_records_pending_escalation() {
        let h = ticket_handler();
        h.on_escalate(&ctx("s1")).await.unwrap();
        let pending = h.list_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session_id, "s1");
        assert!(pending[0].ticket_ref.starts_with("TCK-"));
        assert_eq!(pending[0].reason, EscalationReason::LowFaithfulness);
    }

    #[tokio::test]
    async fn clear_pending_removes_entry() {
        let h = ticket_handler();
        h.on_escalate(&ctx("s1")).await.unwrap();
        assert!(h.clear_pending("s1"));
        assert!(!h.clear_pending("s1"));
        assert!(h.list_pending().is_empty());
    }

    #[tokio::test]
    async fn re_escalation_replaces_pending_entry() {
        let h = ticket_handler();
        h.on_escalate(&ctx("s1")).await.unwrap();
        h.on_escalate(&ctx("s1")).await.unwrap();
        assert_eq!(h.list_pending().len(), 1);
    }

    #[tokio::test]
    async fn missing_ticket_tool_is_an_error() {
        let h = TicketHitlHandler::new(Arc::new(ToolRegistry::build(vec![], vec![])));
        assert!(h.on_escalate(&ctx("s1")).await.is_err());
    }

    #[test]
    fn parse_ticket_ref_from_json() {
        assert_eq!(
            parse_ticket_ref(r#"{"ticket_ref":"TCK-12ab34cd","status":"open"}"#).as_deref(),
            Some("TCK-12ab34cd")
        );
    }

    #[test]
    fn parse_ticket_ref_from_bare_string() {
        assert_eq!(parse_ticket_ref(" TCK-deadbeef ").as_deref(), Some("TCK-deadbeef"));
        assert!(parse_ticket_ref("nope").is_none());
    }
}
