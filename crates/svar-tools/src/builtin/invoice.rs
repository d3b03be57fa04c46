// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// One row of the billing backend.
///
/// The dispatcher does not own billing data; this table stands in for the
/// billing API in environments where it is not wired up.  Lookups are
/// deterministic so conversation flows can be exercised offline.
#[derive(Debug, Clone)]
struct InvoiceRecord {
    id: &'static str,
    amount_cents: i64,
    currency: &'static str,
    status: &'static str,
    refund_status: &'static str,
}

const INVOICES: &[InvoiceRecord] = &[
    InvoiceRecord {
        id: "INV-1",
        amount_cents: 10_000,
        currency: "USD",
        status: "paid",
        refund_status: "refund approved, 3-5 business days",
    },
    InvoiceRecord {
        id: "INV-2",
        amount_cents: 4_950,
        currency: "USD",
        status: "open",
        refund_status: "no refund requested",
    },
    InvoiceRecord {
        id: "INV-3",
        amount_cents: 129_900,
        currency: "EUR",
        status: "overdue",
        refund_status: "refund denied: invoice unpaid",
    },
];

fn find_invoice(id: &str) -> Option<&'static InvoiceRecord> {
    INVOICES.iter().find(|r| r.id.eq_ignore_ascii_case(id))
}

fn invoice_id_arg(call: &ToolCall) -> Option<String> {
    call.args
        .get("invoice_id")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Look up an invoice by its id.
#[derive(Default)]
pub struct LookUpInvoiceTool;

#[async_trait]
impl Tool for LookUpInvoiceTool {
    fn name(&self) -> &str {
        "look_up_invoice"
    }

    fn description(&self) -> &str {
        "Look up an invoice by id (e.g. INV-1). Returns amount, currency and payment status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "invoice_id": {
                    "type": "string",
                    "description": "Invoice identifier, e.g. INV-1"
                }
            },
            "required": ["invoice_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(id) = invoice_id_arg(call) else {
            return ToolOutput::err(&call.id, "missing 'invoice_id'");
        };
        debug!(invoice_id = %id, "look_up_invoice");
        match find_invoice(&id) {
            Some(r) => ToolOutput::ok(
                &call.id,
                json!({
                    "invoice_id": r.id,
                    "amount": format!("{}.{:02}", r.amount_cents / 100, r.amount_cents % 100),
                    "currency": r.currency,
                    "status": r.status,
                })
                .to_string(),
            ),
            None => ToolOutput::err(&call.id, format!("invoice not found: {id}")),
        }
    }
}

/// Check the refund status of an invoice.
#[derive(Default)]
pub struct RefundStatusTool;

#[async_trait]
impl Tool for RefundStatusTool {
    fn name(&self) -> &str {
        "get_refund_status"
    }

    fn description(&self) -> &str {
        "Get the refund status for an invoice id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "invoice_id": {
                    "type": "string",
                    "description": "Invoice identifier, e.g. INV-1"
                }
            },
            "required": ["invoice_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(id) = invoice_id_arg(call) else {
            return ToolOutput::err(&call.id, "missing 'invoice_id'");
        };
        debug!(invoice_id = %id, "get_refund_status");
        match find_invoice(&id) {
            Some(r) => ToolOutput::ok(
                &call.id,
                json!({ "invoice_id": r.id, "refund_status": r.refund_status }).to_string(),
            ),
            None => ToolOutput::err(&call.id, format!("invoice not found: {id}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
