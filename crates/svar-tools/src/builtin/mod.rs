// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod invoice;
pub mod ticket;

use std::sync::Arc;

use crate::Tool;

/// The built-in support-desk tool set shared by all agents.
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(invoice::LookUpInvoiceTool::default()),
        Arc::new(invoice::RefundStatusTool::default()),
        Arc::new(ticket::CreateTicketTool::default()),
    ]
}
