// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use svar_config::{AgentProfileConfig, RunnerConfig};
use svar_model::{
    last_user_text, ChatProvider, ChatRequest, Message, ToolSchema,
};
use svar_runtime::{format_recent, Guardrail, Retriever};
use svar_tools::{ToolCall, ToolOutput, ToolRegistry};

use crate::{
    prompts::{persona_for, react_preamble, turn_prompt},
    react::{parse_react, ReactStep},
    Agent, AgentOutcome, TurnInput,
};

/// Reply returned when the input guard rejects the message.  The turn still
/// succeeds – a rejected input is not an agent failure.
pub const CANNED_SAFE_REPLY: &str =
    "I can only help with questions about our products and services.";

/// Fallback when the tool loop runs out of budget without a final reply.
const EXHAUSTED_REPLY: &str =
    "I'm sorry, I couldn't complete that request. Let me know if I should try again.";

/// Final-text markers that flag the reply as needing a human.
const ESCALATION_MARKERS: &[&str] = &[
    "escalat",
    "unsure",
    "ticket",
    "human agent",
    "cannot help",
    "can't help",
];

/// Executes one agent turn: guard → retrieve → LLM/tool loop → guard.
///
/// Owns its collaborators by `Arc` and is itself shared immutably, so any
/// number of turns may run on it concurrently.
pub struct AgentRunner {
    profile: AgentProfileConfig,
    options: RunnerConfig,
    provider: Arc<dyn ChatProvider>,
    tools: Arc<ToolRegistry>,
    retriever: Arc<dyn Retriever>,
    guard: Arc<Guardrail>,
}

impl AgentRunner {
    pub fn new(
        profile: AgentProfileConfig,
        options: RunnerConfig,
        provider: Arc<dyn ChatProvider>,
        tools: Arc<ToolRegistry>,
        retriever: Arc<dyn Retriever>,
        guard: Arc<Guardrail>,
    ) -> Self {
        Self {
            profile,
            options,
            provider,
            tools,
            retriever,
            guard,
        }
    }

    fn chat_request(&self, messages: Vec<Message>, tools: Vec<ToolSchema>) -> ChatRequest {
        ChatRequest {
            messages,
            tools,
            model: self.profile.model_id.clone().unwrap_or_default(),
            temperature: None,
            top_p: None,
        }
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .schemas()
            .into_iter()
            .map(|s| ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect()
    }

    /// Execute one tool call with the runner's timeout, containing every
    /// failure as an error output the model can react to.
    async fn run_tool(&self, id: &str, name: &str, arguments: &str) -> ToolOutput {
        let args = match serde_json::from_str(arguments) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = name, error = %e, "model sent invalid tool arguments");
                return ToolOutput::err(id, format!("invalid tool arguments: {e}"));
            }
        };
        let call = ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        };
        let timeout = Duration::from_secs(self.options.tool_timeout_seconds);
        match tokio::time::timeout(timeout, self.tools.execute(&call)).await {
            Ok(output) => output,
            Err(_) => ToolOutput::err(id, format!("tool '{name}' timed out")),
        }
    }

    /// The standard tool-calling loop: model call → execute requested tools →
    /// feed results back → repeat until a text reply or the round budget.
    ///
    /// Returns (reply, messages produced by the loop).
    async fn tool_loop(
        &self,
        mut convo: Vec<Message>,
    ) -> anyhow::Result<(String, Vec<Message>)> {
        let schemas = self.tool_schemas();
        let mut produced: Vec<Message> = Vec::new();
        let mut best_effort = String::new();

        for round in 0..self.options.max_tool_iters {
            let resp = self
                .provider
                .chat(self.chat_request(convo.clone(), schemas.clone()))
                .await
                .context("model call failed")?;

            if !resp.has_tool_calls() {
                return Ok((resp.content, produced));
            }
            if !resp.content.is_empty() {
                best_effort = resp.content.clone();
            }

            // The assistant's tool-call message precedes all of its results.
            let assistant = Message {
                role: svar_model::Role::Assistant,
                content: resp.content.clone(),
                tool_call_id: None,
                tool_calls: resp.tool_calls.clone(),
                metadata: None,
            };
            convo.push(assistant.clone());
            produced.push(assistant);

            for tc in &resp.tool_calls {
                debug!(agent = %self.profile.agent_id, tool = %tc.name, round, "executing tool");
                let output = self.run_tool(&tc.id, &tc.name, &tc.arguments).await;
                let msg = Message::tool_result(&tc.id, &tc.name, &output.content);
                convo.push(msg.clone());
                produced.push(msg);
            }
        }

        warn!(
            agent = %self.profile.agent_id,
            budget = self.options.max_tool_iters,
            "tool loop exhausted its round budget"
        );
        let reply = if best_effort.is_empty() {
            EXHAUSTED_REPLY.to_string()
        } else {
            best_effort
        };
        Ok((reply, produced))
    }

    /// ReAct variant: the tool protocol lives in the text stream instead of
    /// native tool calls.
    async fn react_loop(
        &self,
        persona: &str,
        user_block: String,
    ) -> anyhow::Result<(String, Vec<Message>)> {
        let schemas = self.tools.schemas();
        let system = format!("{persona}{}", react_preamble(&schemas));
        let mut convo = vec![Message::system(system), Message::user(user_block)];
        let mut produced: Vec<Message> = Vec::new();

        for step in 0..self.options.react_max_steps {
            let resp = self
                .provider
                .chat(self.chat_request(convo.clone(), Vec::new()))
                .await
                .context("model call failed")?;

            match parse_react(&resp.content) {
                ReactStep::FinalAnswer(answer) => return Ok((answer, produced)),
                ReactStep::Unparsed => return Ok((resp.content, produced)),
                ReactStep::Action { tool, input } => {
                    debug!(agent = %self.profile.agent_id, %tool, step, "react action");
                    let assistant = Message::assistant(&resp.content);
                    convo.push(assistant.clone());
                    produced.push(assistant);

                    let call_id = Uuid::new_v4().to_string();
                    let timeout = Duration::from_secs(self.options.tool_timeout_seconds);
                    let call = ToolCall {
                        id: call_id,
                        name: tool.clone(),
                        args: input,
                    };
                    let output =
                        match tokio::time::timeout(timeout, self.tools.execute(&call)).await {
                            Ok(out) => out,
                            Err(_) => ToolOutput::err(&call.id, format!("tool '{tool}' timed out")),
                        };
                    let observation = Message::user(format!("Observation: {}", output.content));
                    convo.push(observation.clone());
                    produced.push(observation);
                }
            }
        }

        warn!(
            agent = %self.profile.agent_id,
            budget = self.options.react_max_steps,
            "react loop exhausted its step budget"
        );
        Ok((EXHAUSTED_REPLY.to_string(), produced))
    }
}

/// Heuristic read of the final text: does the agent consider the case closed,
/// and did it ask for a human?
fn assess(text: &str) -> (bool, bool) {
    let lower = text.to_lowercase();
    let needs_escalation = ESCALATION_MARKERS.iter().any(|m| lower.contains(m));
    (!needs_escalation, needs_escalation)
}

#[async_trait]
impl Agent for AgentRunner {
    fn id(&self) -> &str {
        &self.profile.agent_id
    }

    async fn invoke(&self, input: &TurnInput) -> anyhow::Result<AgentOutcome> {
        let query = last_user_text(&input.messages).unwrap_or("").to_string();

        let verdict = self.guard.guard_input(&query);
        if !verdict.passed {
            debug!(agent = %self.profile.agent_id, reason = %verdict.reason, "input rejected");
            return Ok(AgentOutcome {
                messages: vec![Message::assistant(CANNED_SAFE_REPLY)],
                last_rag_context: String::new(),
                resolved: false,
                needs_escalation: false,
                input_rejected: true,
            });
        }

        let filters = serde_json::json!({ "agent_id": self.profile.agent_id });
        let chunks = self
            .retriever
            .retrieve(&query, self.options.top_k, Some(&filters))
            .await
            .context("document retrieval failed")?;
        let doc_context = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let history = format_recent(&input.messages, self.options.history_window);
        let persona = persona_for(
            &self.profile.agent_id,
            self.profile.persona.as_deref(),
        );
        let user_block = turn_prompt(&history, &doc_context, &query);

        let (reply, mut messages) = if self.options.react_enabled {
            self.react_loop(&persona, user_block).await?
        } else {
            let convo = vec![Message::system(persona), Message::user(user_block)];
            self.tool_loop(convo).await?
        };

        let filtered = self.guard.guard_output(&reply);
        let (resolved, needs_escalation) = assess(&filtered);
        messages.push(Message::assistant(&filtered));

        Ok(AgentOutcome {
            messages,
            last_rag_context: doc_context,
            resolved,
            needs_escalation,
            input_rejected: false,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use svar_model::{ChatResponse, Role, ScriptedProvider, ToolCallRequest};
    use svar_runtime::StaticRetriever;
    use svar_tools::default_tools;

    use super::*;

    fn runner_with(provider: ScriptedProvider, options: RunnerConfig) -> AgentRunner {
        let profile = AgentProfileConfig::builtin_set()
            .into_iter()
            .find(|p| p.agent_id == "billing")
            .unwrap();
        AgentRunner::new(
            profile,
            options,
            Arc::new(provider),
            Arc::new(ToolRegistry::build(default_tools(), vec![])),
            Arc::new(StaticRetriever::with_default_docs()),
            Arc::new(Guardrail::new(
                true,
                vec!["hack".into()],
                vec!["password".into()],
                8_000,
                4_000,
            )),
        )
    }

    fn turn(message: &str) -> TurnInput {
        TurnInput {
            messages: vec![Message::user(message)],
            session_id: "s1".into(),
            user_id: "u1".into(),
        }
    }

    #[tokio::test]
    async fn plain_reply_passes_through() {
        let runner = runner_with(
            ScriptedProvider::always_text("Your refund was approved."),
            RunnerConfig::default(),
        );
        let out = runner.invoke(&turn("refund for INV-1 please")).await.unwrap();
        assert!(out.resolved);
        assert!(!out.needs_escalation);
        let last = out.messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Your refund was approved.");
        assert!(!out.last_rag_context.is_empty());
    }

    #[tokio::test]
    async fn tool_call_round_trips_through_registry() {
        let runner = runner_with(
            ScriptedProvider::tool_then_text(
                "c1",
                "look_up_invoice",
                r#"{"invoice_id":"INV-1"}"#,
                "Invoice INV-1 is paid in full.",
            ),
            RunnerConfig::default(),
        );
        let out = runner.invoke(&turn("what about invoice INV-1?")).await.unwrap();
        // Loop produced: assistant tool-call shell, tool result, final reply.
        assert_eq!(out.messages.len(), 3);
        assert_eq!(out.messages[0].tool_calls[0].name, "look_up_invoice");
        assert_eq!(out.messages[1].role, Role::Tool);
        assert!(out.messages[1].content.contains("paid"));
        assert_eq!(out.messages[2].content, "Invoice INV-1 is paid in full.");
    }

    #[tokio::test]
    async fn unknown_tool_is_surfaced_as_tool_error() {
        let runner = runner_with(
            ScriptedProvider::tool_then_text("c1", "no_such_tool", "{}", "recovered"),
            RunnerConfig::default(),
        );
        let out = runner.invoke(&turn("invoice question")).await.unwrap();
        assert!(out.messages[1].content.contains("unknown tool"));
        assert_eq!(out.messages.last().unwrap().content, "recovered");
    }

    #[tokio::test]
    async fn invalid_tool_arguments_are_surfaced_as_tool_error() {
        let runner = runner_with(
            ScriptedProvider::tool_then_text("c1", "look_up_invoice", "{not json", "recovered"),
            RunnerConfig::default(),
        );
        let out = runner.invoke(&turn("invoice question")).await.unwrap();
        assert!(out.messages[1].content.contains("invalid tool arguments"));
    }

    #[tokio::test]
    async fn guard_rejection_short_circuits_before_model() {
        let provider = ScriptedProvider::always_text("should never be called");
        let runner = runner_with(provider, RunnerConfig::default());
        let out = runner.invoke(&turn("how to hack accounts")).await.unwrap();
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].content, CANNED_SAFE_REPLY);
        assert!(!out.needs_escalation);
        assert!(out.input_rejected);
        assert!(out.last_rag_context.is_empty());
    }

    #[tokio::test]
    async fn tool_loop_budget_returns_best_effort() {
        // Every round requests another tool call; the loop must stop at the
        // budget and still produce a well-formed reply.
        let call = |i: u32| ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: format!("c{i}"),
                name: "look_up_invoice".into(),
                arguments: r#"{"invoice_id":"INV-1"}"#.into(),
            }],
        };
        let mut options = RunnerConfig::default();
        options.max_tool_iters = 2;
        let runner = runner_with(
            ScriptedProvider::new(vec![call(1), call(2), call(3)]),
            options,
        );
        let out = runner.invoke(&turn("invoice INV-1")).await.unwrap();
        let last = out.messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(!last.content.is_empty());
    }

    #[tokio::test]
    async fn escalation_marker_sets_needs_escalation() {
        let runner = runner_with(
            ScriptedProvider::always_text("I'm unsure, let me escalate this to a human agent."),
            RunnerConfig::default(),
        );
        let out = runner.invoke(&turn("weird billing question")).await.unwrap();
        assert!(out.needs_escalation);
        assert!(!out.resolved);
    }

    #[tokio::test]
    async fn output_guard_filters_reply() {
        let runner = runner_with(
            ScriptedProvider::always_text("your password is hunter2"),
            RunnerConfig::default(),
        );
        let out = runner.invoke(&turn("billing question")).await.unwrap();
        let last = out.messages.last().unwrap();
        assert!(last.content.contains("[content removed]"));
        assert!(!last.content.to_lowercase().contains("password"));
    }

    #[tokio::test]
    async fn react_loop_executes_action_then_final_answer() {
        let mut options = RunnerConfig::default();
        options.react_enabled = true;
        let runner = runner_with(
            ScriptedProvider::new(vec![
                ChatResponse::text(
                    "Thought: need the invoice.\nAction: look_up_invoice\nAction Input: {\"invoice_id\":\"INV-1\"}",
                ),
                ChatResponse::text("Final Answer: INV-1 is paid."),
            ]),
            options,
        );
        let out = runner.invoke(&turn("is INV-1 paid?")).await.unwrap();
        assert_eq!(out.messages.last().unwrap().content, "INV-1 is paid.");
        // Observation carried the tool result back into the conversation.
        assert!(out
            .messages
            .iter()
            .any(|m| m.content.starts_with("Observation:") && m.content.contains("paid")));
    }

    #[tokio::test]
    async fn provider_failure_propagates_as_error() {
        let profile = AgentProfileConfig::builtin_set().remove(0);
        let runner = AgentRunner::new(
            profile,
            RunnerConfig::default(),
            Arc::new(svar_model::FailingProvider::new("backend down")),
            Arc::new(ToolRegistry::build(default_tools(), vec![])),
            Arc::new(StaticRetriever::with_default_docs()),
            Arc::new(Guardrail::disabled()),
        );
        assert!(runner.invoke(&turn("hello")).await.is_err());
    }
}
