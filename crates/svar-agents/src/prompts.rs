// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use svar_tools::ToolSchema;

const SUPPORT_PERSONA: &str = "\
You are a friendly customer support agent for our product. Answer only from \
the retrieved context and the conversation history. If the context does not \
cover the question, say you are unsure and offer to escalate to a human agent.";

const BILLING_PERSONA: &str = "\
You are a billing specialist. You help with invoices, payments and refunds. \
Ground every amount and status in the invoice tools and the retrieved \
context – never guess figures. If a case needs manual review, say so and \
offer to create a support ticket.";

const TECH_PERSONA: &str = "\
You are a technical support engineer. Diagnose installation and runtime \
problems step by step using the retrieved context. Ask for log output when \
the context is insufficient, and escalate bugs you cannot resolve.";

const ESCALATION_PERSONA: &str = "\
You are the handoff coordinator. The customer asked for a human. Confirm the \
request, summarise the conversation in one or two sentences, and state that \
you are escalating to a human agent.";

/// Persona text for an agent id.  Unknown ids get the generic support
/// persona prefixed with their id so transcripts stay attributable.
pub fn persona_for(agent_id: &str, override_text: Option<&str>) -> String {
    if let Some(text) = override_text {
        return text.to_string();
    }
    match agent_id {
        "support" => SUPPORT_PERSONA.to_string(),
        "billing" => BILLING_PERSONA.to_string(),
        "tech" => TECH_PERSONA.to_string(),
        "escalation" => ESCALATION_PERSONA.to_string(),
        other => format!("You are the '{other}' agent. {SUPPORT_PERSONA}"),
    }
}

/// Build the single user message combining short-term history, retrieved
/// context and the current question, each section labeled.
pub fn turn_prompt(history: &str, doc_context: &str, query: &str) -> String {
    format!(
        "Conversation so far:\n{}\n\nRetrieved context:\n{}\n\nCustomer message:\n{}",
        if history.is_empty() { "(none)" } else { history },
        if doc_context.is_empty() { "(none)" } else { doc_context },
        query
    )
}

/// ReAct protocol preamble appended to the persona when the ReAct loop is
/// enabled.  Lists the available tools by name since the model does not get
/// native tool schemas in this mode.
pub fn react_preamble(tools: &[ToolSchema]) -> String {
    let mut tool_lines = String::new();
    for t in tools {
        tool_lines.push_str(&format!("- {}: {}\n", t.name, t.description));
    }
    format!(
        "\n\nYou can use the following tools:\n{tool_lines}\
         Respond in this exact format:\n\
         Thought: your reasoning\n\
         Action: the tool name\n\
         Action Input: the tool arguments as a JSON object\n\
         After each Action you will receive an Observation with the result.\n\
         When you can answer the customer, respond with:\n\
         Final Answer: your reply to the customer"
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
