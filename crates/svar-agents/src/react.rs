// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

/// One parsed ReAct model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactStep {
    /// The model produced `Final Answer:` – the reply to the customer.
    FinalAnswer(String),
    /// The model requested a tool invocation.
    Action { tool: String, input: Value },
    /// Neither marker found; the raw text is the best available reply.
    Unparsed,
}

/// Parse one ReAct turn.
///
/// `Final Answer:` wins over `Action:` when both are present (the model is
/// done reasoning).  `Action Input:` accepts a JSON object or a bare scalar;
/// a scalar is wrapped as `{"input": <scalar>}` so tools always receive an
/// object.  A missing input becomes `{}`.
pub fn parse_react(text: &str) -> ReactStep {
    if let Some(pos) = text.find("Final Answer:") {
        let answer = text[pos + "Final Answer:".len()..].trim();
        return ReactStep::FinalAnswer(answer.to_string());
    }

    let mut tool: Option<String> = None;
    let mut input: Option<String> = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Action:") {
            if tool.is_none() {
                let name = rest.trim();
                if !name.is_empty() {
                    tool = Some(name.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("Action Input:") {
            if input.is_none() {
                input = Some(rest.trim().to_string());
            }
        }
    }

    match tool {
        Some(tool) => {
            let input = match input.as_deref() {
                None | Some("") => Value::Object(Default::default()),
                Some(raw) => match serde_json::from_str::<Value>(raw) {
                    Ok(Value::Object(m)) => Value::Object(m),
                    Ok(scalar) => serde_json::json!({ "input": scalar }),
                    Err(_) => serde_json::json!({ "input": raw }),
                },
            };
            ReactStep::Action { tool, input }
        }
        None => ReactStep::Unparsed,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
