// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Create a support ticket.
///
/// Used both by the LLM (when a customer asks for a ticket) and by the HITL
/// ticket handler when a turn escalates.  Returns a JSON object carrying the
/// generated `ticket_ref` so callers can parse it back out.
#[derive(Default)]
pub struct CreateTicketTool;

/// Generate a `TCK-<8 hex>` ticket reference.
fn new_ticket_ref() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("TCK-{hex}")
}

#[async_trait]
impl Tool for CreateTicketTool {
    fn name(&self) -> &str {
        "create_support_ticket"
    }

    fn description(&self) -> &str {
        "Create a support ticket for follow-up by a human agent. \
         Provide a short summary and optionally the session id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "One-line description of the issue"
                },
                "session_id": {
                    "type": "string",
                    "description": "Conversation session the ticket belongs to"
                }
            },
            "required": ["summary"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(summary) = call.args.get("summary").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'summary'");
        };
        let session_id = call
            .args
            .get("session_id")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let ticket_ref = new_ticket_ref();
        info!(%ticket_ref, session_id, summary, "support ticket created");
        ToolOutput::ok(
            &call.id,
            json!({ "ticket_ref": ticket_ref, "status": "open" }).to_string(),
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
