// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The per-session supervisor state machine.
//!
//! One chat turn is a strict pipeline over the checkpointed
//! [`SupervisorState`]:
//!
//! ```text
//! entry → plan → route → invoke → aggregate → {escalate | end}
//! ```
//!
//! Nodes are plain methods over `&mut SupervisorState`; the driver picks the
//! next node from the static [`successor`] table, so each node stays
//! individually testable.  Concurrent turns for the same session are
//! serialized through a per-session lock; turns for different sessions run
//! fully in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use svar_agents::{AgentOutcome, AgentRegistry, TurnInput};
use svar_config::{Config, SupervisorConfig};
use svar_model::{ChatProvider, ChatRequest, Message};
use svar_runtime::FaithfulnessScorer;

use crate::{
    AgentLimiter, Checkpointer, CircuitBreaker, DispatchError, EscalationContext,
    EscalationReason, HitlHandler, SupervisorState,
};

/// Appended as the final message of every escalated turn.
pub const ESCALATION_MESSAGE: &str = "I'm connecting you with a human agent. Please hold.";

/// Appended when an invocation fails beyond recovery, before escalation.
pub const FAILURE_MESSAGE: &str =
    "I'm sorry, something went wrong while handling your request. \
     I'm connecting you with a human agent.";

/// One incoming chat turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_id: String,
    pub message: String,
    /// Ordered candidates from the session router.
    pub suggested_agent_ids: Vec<String>,
}

/// The finished turn as returned to the frontend.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub session_id: String,
    pub agent_id: Option<String>,
    pub reply: String,
    pub state: SupervisorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Plan,
    Route,
    Invoke,
    Aggregate,
    Escalate,
}

/// Static transition table.  `None` ends the turn.
fn successor(node: Node, state: &SupervisorState) -> Option<Node> {
    match node {
        Node::Plan => Some(Node::Route),
        Node::Route => Some(Node::Invoke),
        Node::Invoke => Some(Node::Aggregate),
        Node::Aggregate => {
            if state.needs_escalation {
                Some(Node::Escalate)
            } else {
                None
            }
        }
        Node::Escalate => None,
    }
}

/// Orchestrates plan → route → invoke → aggregate → escalate over persisted
/// per-session state.
pub struct Supervisor {
    registry: Arc<AgentRegistry>,
    /// LLM used by the optional plan node.
    planner: Arc<dyn ChatProvider>,
    breaker: Arc<CircuitBreaker>,
    checkpointer: Arc<dyn Checkpointer>,
    scorer: Arc<dyn FaithfulnessScorer>,
    hitl: Arc<dyn HitlHandler>,
    hitl_enabled: bool,
    cfg: SupervisorConfig,
    limiters: HashMap<String, AgentLimiter>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Set when the checkpointer misbehaves; surfaced by the health endpoint.
    degraded: AtomicBool,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        registry: Arc<AgentRegistry>,
        planner: Arc<dyn ChatProvider>,
        breaker: Arc<CircuitBreaker>,
        checkpointer: Arc<dyn Checkpointer>,
        scorer: Arc<dyn FaithfulnessScorer>,
        hitl: Arc<dyn HitlHandler>,
    ) -> Self {
        let limiters = config
            .agent_profiles()
            .into_iter()
            .map(|p| {
                (
                    p.agent_id.clone(),
                    AgentLimiter::new(&p.agent_id, p.max_concurrent, p.queue_len),
                )
            })
            .collect();
        Self {
            registry,
            planner,
            breaker,
            checkpointer,
            scorer,
            hitl,
            hitl_enabled: config.hitl.enabled,
            cfg: config.supervisor.clone(),
            limiters,
            session_locks: Mutex::new(HashMap::new()),
            degraded: AtomicBool::new(false),
        }
    }

    /// Registered agent ids, for status displays.
    pub fn agent_ids(&self) -> &[String] {
        self.registry.ids()
    }

    /// True when a checkpointer failure forced a turn onto in-memory state.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Run one chat turn end-to-end and persist the resulting state.
    pub async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, DispatchError> {
        // Serialize turns per session so concurrent requests cannot
        // interleave message history.
        let lock = self.session_lock(&req.session_id).await;
        let _guard = lock.lock().await;

        let deadline = Instant::now() + Duration::from_secs(self.cfg.request_deadline_seconds);

        let mut state = match self.checkpointer.get(&req.session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => SupervisorState::new(&req.session_id, &req.user_id),
            Err(e) => {
                warn!(error = %e, session_id = %req.session_id,
                    "checkpoint load failed, proceeding with fresh in-memory state");
                self.degraded.store(true, Ordering::SeqCst);
                SupervisorState::new(&req.session_id, &req.user_id)
            }
        };
        state.user_id = req.user_id.clone();
        state.begin_turn(&req.message, req.suggested_agent_ids.clone());

        let mut node = Node::Plan;
        loop {
            match node {
                Node::Plan => self.plan(&mut state).await,
                Node::Route => self.route(&mut state),
                Node::Invoke => self.invoke(&mut state, deadline).await?,
                Node::Aggregate => self.aggregate(&mut state).await,
                Node::Escalate => self.escalate(&mut state).await,
            }
            match successor(node, &state) {
                Some(next) => node = next,
                None => break,
            }
        }

        state.truncate_messages(self.cfg.messages_max_len);
        if let Err(e) = self.checkpointer.put(&req.session_id, state.clone()).await {
            warn!(error = %e, session_id = %req.session_id,
                "checkpoint save failed, session state is in-memory only");
            self.degraded.store(true, Ordering::SeqCst);
        }

        let reply = state
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let agent_id = if state.current_agent.is_empty() {
            None
        } else {
            Some(state.current_agent.clone())
        };
        Ok(TurnResult {
            session_id: req.session_id,
            agent_id,
            reply,
            state,
        })
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ── Nodes ─────────────────────────────────────────────────────────────────

    /// Ask the planner LLM to pick one agent.  Best-effort: any failure or
    /// unrecognized reply leaves the planned list empty and never blocks the
    /// turn.
    async fn plan(&self, state: &mut SupervisorState) {
        if !self.cfg.planning_enabled {
            return;
        }
        let Some(query) = state.last_user_text().map(String::from) else {
            return;
        };
        let known = self.registry.ids().join(", ");
        let req = ChatRequest {
            messages: vec![
                Message::system(format!(
                    "You route customer messages to one support agent. \
                     Reply with exactly one agent id from: {known}. Reply with the id only."
                )),
                Message::user(query),
            ],
            tools: Vec::new(),
            model: String::new(),
            temperature: Some(0.0),
            top_p: Some(1.0),
        };
        match self.planner.chat(req).await {
            Ok(resp) => {
                let choice = resp.content.trim().to_lowercase();
                let picked = self
                    .registry
                    .ids()
                    .iter()
                    .find(|id| choice == **id)
                    .or_else(|| {
                        self.registry
                            .ids()
                            .iter()
                            .find(|id| choice.contains(id.as_str()))
                    });
                if let Some(id) = picked {
                    debug!(agent = %id, "planner selected agent");
                    state.planned_agent_ids = vec![id.clone()];
                } else {
                    debug!(reply = %choice, "planner reply matched no agent");
                }
            }
            Err(e) => {
                debug!(error = %e, "planner call failed, continuing without a plan");
            }
        }
    }

    /// Select `current_agent`.  The planner's choice wins over the router's;
    /// open circuits are filtered out, and when filtering (or registration)
    /// leaves nothing, the fallback agent takes the turn.
    fn route(&self, state: &mut SupervisorState) {
        let mut candidates = if !state.planned_agent_ids.is_empty() {
            state.planned_agent_ids.clone()
        } else {
            state.suggested_agent_ids.clone()
        };
        if candidates.is_empty() {
            candidates.push(self.cfg.failover_fallback_agent_id.clone());
        }

        if self.cfg.agent_ops_enabled {
            candidates.retain(|id| self.breaker.is_available(id));
        }

        let selected = candidates
            .iter()
            .find(|id| self.registry.contains(id))
            .cloned()
            .unwrap_or_else(|| self.cfg.failover_fallback_agent_id.clone());

        debug!(agent = %selected, ?candidates, "routed turn");
        state.current_agent = selected;
    }

    /// Invoke the selected agent, recording the outcome in the circuit
    /// breaker.  A failure triggers at most one failover attempt; exhaustion
    /// funnels into the friendly-failure escalation path.
    async fn invoke(
        &self,
        state: &mut SupervisorState,
        deadline: Instant,
    ) -> Result<(), DispatchError> {
        let agent_id = state.current_agent.clone();
        match self.invoke_agent(&agent_id, state, deadline).await {
            Ok(outcome) => {
                // A guard-rejected input never reached the model; it is not
                // an invocation outcome and must not move the circuit.
                if !outcome.input_rejected {
                    self.breaker.record_success(&agent_id);
                }
                apply_outcome(state, outcome);
                return Ok(());
            }
            Err(DispatchError::Overload(id)) => {
                // Admission failure: no invocation happened, nothing to
                // record.  Fail the request so the frontend returns 503.
                return Err(DispatchError::Overload(id));
            }
            Err(DispatchError::Internal(e)) => {
                warn!(agent = %agent_id, error = %e, "agent invocation failed");
                self.breaker.record_failure(&agent_id);
            }
        }

        let fallback = self.cfg.failover_fallback_agent_id.clone();
        if self.cfg.failover_enabled && agent_id != fallback && self.registry.contains(&fallback) {
            info!(from = %agent_id, to = %fallback, "failing over");
            state.current_agent = fallback.clone();
            match self.invoke_agent(&fallback, state, deadline).await {
                Ok(outcome) => {
                    self.breaker.record_success(&fallback);
                    apply_outcome(state, outcome);
                    return Ok(());
                }
                Err(DispatchError::Overload(_)) => {
                    warn!(agent = %fallback, "fallback at capacity");
                }
                Err(DispatchError::Internal(e)) => {
                    warn!(agent = %fallback, error = %e, "fallback invocation failed");
                    self.breaker.record_failure(&fallback);
                }
            }
        }

        state.messages.push(Message::assistant(FAILURE_MESSAGE));
        state.last_rag_context.clear();
        state.escalate(EscalationReason::InvocationFailed);
        Ok(())
    }

    async fn invoke_agent(
        &self,
        agent_id: &str,
        state: &SupervisorState,
        deadline: Instant,
    ) -> Result<AgentOutcome, DispatchError> {
        let agent = self.registry.get(agent_id).ok_or_else(|| {
            DispatchError::Internal(anyhow::anyhow!("agent '{agent_id}' is not registered"))
        })?;

        let _permit = match self.limiters.get(agent_id) {
            Some(limiter) => Some(limiter.acquire().await?),
            None => None,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DispatchError::Internal(anyhow::anyhow!(
                "request deadline exhausted before invoking '{agent_id}'"
            )));
        }
        let timeout = remaining.min(Duration::from_secs(
            self.cfg.agent_invocation_timeout_seconds,
        ));

        let input = TurnInput {
            messages: state.messages.clone(),
            session_id: state.session_id.clone(),
            user_id: state.user_id.clone(),
        };
        match tokio::time::timeout(timeout, agent.invoke(&input)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(DispatchError::Internal(e)),
            Err(_) => Err(DispatchError::Internal(anyhow::anyhow!(
                "agent '{agent_id}' timed out after {timeout:?}"
            ))),
        }
    }

    /// Score the reply against the retrieved context.  A turn that is
    /// already escalating keeps its original reason – the gate only adds
    /// low-faithfulness escalations, never replaces one.
    async fn aggregate(&self, state: &mut SupervisorState) {
        if state.needs_escalation {
            return;
        }
        let reply = state.last_assistant_text().unwrap_or("").to_string();
        let score = self.scorer.score(&reply, &state.last_rag_context).await;
        if score < self.cfg.faithfulness_threshold {
            info!(
                score,
                threshold = self.cfg.faithfulness_threshold,
                session_id = %state.session_id,
                "reply below faithfulness threshold, escalating"
            );
            state.escalate(EscalationReason::LowFaithfulness);
        }
    }

    /// Hand the conversation to the HITL handler and append the fixed
    /// escalation reply.  Handler failures are logged, never surfaced.
    async fn escalate(&self, state: &mut SupervisorState) {
        let ctx = EscalationContext {
            session_id: state.session_id.clone(),
            user_id: state.user_id.clone(),
            reason: state.escalation_reason,
            last_user_message: state.last_user_text().unwrap_or("").to_string(),
            last_agent_message: state.last_assistant_text().unwrap_or("").to_string(),
            metadata: if state.metadata.is_empty() {
                None
            } else {
                Some(Value::Object(state.metadata.clone()))
            },
        };
        if self.hitl_enabled {
            if let Err(e) = self.hitl.on_escalate(&ctx).await {
                warn!(error = %e, session_id = %state.session_id,
                    "HITL handler failed; user still gets the escalation reply");
            }
        }
        state.messages.push(Message::assistant(ESCALATION_MESSAGE));
    }
}

fn apply_outcome(state: &mut SupervisorState, outcome: AgentOutcome) {
    state.messages.extend(outcome.messages);
    state.last_rag_context = outcome.last_rag_context;
    state.resolved = outcome.resolved;
    if outcome.needs_escalation {
        state.escalate(EscalationReason::AgentRequested);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use svar_agents::AgentRunner;
    use svar_config::{AgentProfileConfig, Config};
    use svar_model::{ChatProvider, FailingProvider, ScriptedProvider};
    use svar_runtime::{FixedScorer, Guardrail, NullScorer, StaticRetriever};
    use svar_tools::{default_tools, ToolRegistry};

    use crate::checkpoint::FailingCheckpointer;
    use crate::{MemoryCheckpointer, StubHitlHandler, TicketHitlHandler};

    use super::*;

    fn runner(agent_id: &str, provider: Arc<dyn ChatProvider>) -> Arc<AgentRunner> {
        let profile = AgentProfileConfig::builtin_set()
            .into_iter()
            .find(|p| p.agent_id == agent_id)
            .unwrap();
        Arc::new(AgentRunner::new(
            profile,
            Default::default(),
            provider,
            Arc::new(ToolRegistry::build(default_tools(), vec![])),
            Arc::new(StaticRetriever::with_default_docs()),
            Arc::new(Guardrail::disabled()),
        ))
    }

    struct Harness {
        supervisor: Supervisor,
        breaker: Arc<CircuitBreaker>,
        checkpointer: Arc<MemoryCheckpointer>,
    }

    /// Build a supervisor with per-agent scripted providers and a shared
    /// null scorer unless overridden.
    fn harness(
        agents: Vec<(&str, Arc<dyn ChatProvider>)>,
        scorer: Arc<dyn FaithfulnessScorer>,
        hitl: Arc<dyn HitlHandler>,
        config: Config,
    ) -> Harness {
        let mut registry = AgentRegistry::new();
        for (id, provider) in agents {
            registry.register(runner(id, provider));
        }
        let breaker = Arc::new(CircuitBreaker::new(
            config.supervisor.circuit_breaker_failure_threshold,
            Duration::from_secs(config.supervisor.circuit_breaker_cooldown_seconds),
        ));
        let checkpointer = Arc::new(MemoryCheckpointer::new(Duration::from_secs(
            config.supervisor.session_ttl_seconds,
        )));
        let checkpointer_dyn: Arc<dyn Checkpointer> = checkpointer.clone();
        let supervisor = Supervisor::new(
            &config,
            Arc::new(registry),
            Arc::new(ScriptedProvider::new(vec![])),
            Arc::clone(&breaker),
            checkpointer_dyn,
            scorer,
            hitl,
        );
        Harness {
            supervisor,
            breaker,
            checkpointer,
        }
    }

    fn turn(session: &str, message: &str, suggested: &[&str]) -> TurnRequest {
        TurnRequest {
            session_id: session.into(),
            user_id: "u1".into(),
            message: message.into(),
            suggested_agent_ids: suggested.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn happy_path_returns_reply_and_persists_state() {
        let h = harness(
            vec![(
                "billing",
                Arc::new(ScriptedProvider::always_text("Your refund is approved.")),
            )],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            Config::default(),
        );
        let result = h
            .supervisor
            .run_turn(turn("s1", "refund for INV-1", &["billing"]))
            .await
            .unwrap();
        assert_eq!(result.agent_id.as_deref(), Some("billing"));
        assert_eq!(result.reply, "Your refund is approved.");
        assert!(!result.state.needs_escalation);

        let saved = h.checkpointer.get("s1").await.unwrap().unwrap();
        assert_eq!(
            saved.messages.last().unwrap().content,
            "Your refund is approved."
        );
    }

    #[tokio::test]
    async fn second_turn_sees_prior_history() {
        let h = harness(
            vec![(
                "support",
                Arc::new(ScriptedProvider::new(vec![
                    svar_model::ChatResponse::text("first reply"),
                    svar_model::ChatResponse::text("second reply"),
                ])),
            )],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            Config::default(),
        );
        h.supervisor
            .run_turn(turn("s1", "first question", &["support"]))
            .await
            .unwrap();
        let result = h
            .supervisor
            .run_turn(turn("s1", "second question", &["support"]))
            .await
            .unwrap();
        // 2 user + 2 assistant messages accumulated across turns.
        assert_eq!(result.state.messages.len(), 4);
        assert_eq!(result.state.messages[0].content, "first question");
    }

    #[tokio::test]
    async fn open_circuit_routes_to_fallback_without_invoking() {
        let config = Config::default();
        let h = harness(
            vec![
                (
                    "billing",
                    Arc::new(FailingProvider::new("billing must not be called")),
                ),
                (
                    "support",
                    Arc::new(ScriptedProvider::always_text("support here")),
                ),
            ],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            config,
        );
        for _ in 0..3 {
            h.breaker.record_failure("billing");
        }
        let result = h
            .supervisor
            .run_turn(turn("s1", "invoice help", &["billing"]))
            .await
            .unwrap();
        assert_eq!(result.agent_id.as_deref(), Some("support"));
        assert_eq!(result.reply, "support here");
        // Billing was never invoked: its circuit saw no new outcome.
        assert_eq!(h.breaker.status("billing"), crate::CircuitStatus::Open);
    }

    #[tokio::test]
    async fn later_suggestions_are_fallbacks_when_earlier_filtered() {
        let h = harness(
            vec![
                ("billing", Arc::new(FailingProvider::new("nope"))),
                ("tech", Arc::new(ScriptedProvider::always_text("tech reply"))),
            ],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            Config::default(),
        );
        for _ in 0..3 {
            h.breaker.record_failure("billing");
        }
        let result = h
            .supervisor
            .run_turn(turn("s1", "billing error", &["billing", "tech"]))
            .await
            .unwrap();
        assert_eq!(result.agent_id.as_deref(), Some("tech"));
    }

    #[tokio::test]
    async fn invoke_failure_fails_over_once_and_succeeds() {
        let h = harness(
            vec![
                ("billing", Arc::new(FailingProvider::new("backend down"))),
                (
                    "support",
                    Arc::new(ScriptedProvider::always_text("fallback reply")),
                ),
            ],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            Config::default(),
        );
        let result = h
            .supervisor
            .run_turn(turn("s1", "refund please", &["billing"]))
            .await
            .unwrap();
        assert_eq!(result.agent_id.as_deref(), Some("support"));
        assert_eq!(result.reply, "fallback reply");
        assert!(!result.state.needs_escalation);
    }

    #[tokio::test]
    async fn exhausted_failover_escalates_with_invocation_failed() {
        let mut config = Config::default();
        config.supervisor.failover_enabled = false;
        let h = harness(
            vec![("billing", Arc::new(FailingProvider::new("down")))],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            config,
        );
        let result = h
            .supervisor
            .run_turn(turn("s1", "refund please", &["billing"]))
            .await
            .unwrap();
        assert!(result.state.needs_escalation);
        assert_eq!(
            result.state.escalation_reason,
            EscalationReason::InvocationFailed
        );
        assert_eq!(result.reply, ESCALATION_MESSAGE);
        let n = result.state.messages.len();
        assert_eq!(result.state.messages[n - 2].content, FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn three_failures_open_the_circuit() {
        let mut config = Config::default();
        config.supervisor.failover_enabled = false;
        let h = harness(
            vec![("billing", Arc::new(FailingProvider::new("down")))],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            config,
        );
        for i in 0..2 {
            h.supervisor
                .run_turn(turn(&format!("s{i}"), "x", &["billing"]))
                .await
                .unwrap();
            assert_eq!(h.breaker.status("billing"), crate::CircuitStatus::Closed);
        }
        h.supervisor
            .run_turn(turn("s3", "x", &["billing"]))
            .await
            .unwrap();
        assert_eq!(h.breaker.status("billing"), crate::CircuitStatus::Open);
    }

    #[tokio::test]
    async fn low_faithfulness_escalates_and_creates_ticket() {
        let tickets = Arc::new(TicketHitlHandler::new(Arc::new(ToolRegistry::build(
            default_tools(),
            vec![],
        ))));
        let h = harness(
            vec![(
                "billing",
                Arc::new(ScriptedProvider::always_text("your payment was $999")),
            )],
            Arc::new(FixedScorer(0.3)),
            tickets.clone(),
            Config::default(),
        );
        let result = h
            .supervisor
            .run_turn(turn("s1", "Was my payment $999?", &["billing"]))
            .await
            .unwrap();
        assert!(result.state.needs_escalation);
        assert_eq!(
            result.state.escalation_reason,
            EscalationReason::LowFaithfulness
        );
        assert_eq!(result.reply, ESCALATION_MESSAGE);
        let pending = tickets.list_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session_id, "s1");
    }

    #[tokio::test]
    async fn score_equal_to_threshold_does_not_escalate() {
        let h = harness(
            vec![(
                "billing",
                Arc::new(ScriptedProvider::always_text("grounded enough")),
            )],
            Arc::new(FixedScorer(0.8)),
            Arc::new(StubHitlHandler),
            Config::default(),
        );
        let result = h
            .supervisor
            .run_turn(turn("s1", "question", &["billing"]))
            .await
            .unwrap();
        assert!(!result.state.needs_escalation);
    }

    #[tokio::test]
    async fn hitl_failure_does_not_break_the_turn() {
        struct ExplodingHandler;
        #[async_trait::async_trait]
        impl HitlHandler for ExplodingHandler {
            async fn on_escalate(&self, _ctx: &EscalationContext) -> anyhow::Result<()> {
                anyhow::bail!("handler exploded")
            }
        }
        let h = harness(
            vec![("billing", Arc::new(ScriptedProvider::always_text("reply")))],
            Arc::new(FixedScorer(0.0)),
            Arc::new(ExplodingHandler),
            Config::default(),
        );
        let result = h
            .supervisor
            .run_turn(turn("s1", "question", &["billing"]))
            .await
            .unwrap();
        assert_eq!(result.reply, ESCALATION_MESSAGE);
    }

    #[tokio::test]
    async fn planner_choice_wins_over_router_suggestion() {
        let mut config = Config::default();
        config.supervisor.planning_enabled = true;
        let mut registry = AgentRegistry::new();
        registry.register(runner(
            "billing",
            Arc::new(FailingProvider::new("wrong agent")),
        ));
        registry.register(runner(
            "tech",
            Arc::new(ScriptedProvider::always_text("tech wins")),
        ));
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(60)));
        let supervisor = Supervisor::new(
            &config,
            Arc::new(registry),
            Arc::new(ScriptedProvider::always_text("tech")),
            breaker,
            Arc::new(MemoryCheckpointer::new(Duration::from_secs(60))),
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
        );
        let result = supervisor
            .run_turn(turn("s1", "anything", &["billing"]))
            .await
            .unwrap();
        assert_eq!(result.agent_id.as_deref(), Some("tech"));
        assert_eq!(result.reply, "tech wins");
    }

    #[tokio::test]
    async fn checkpointer_failure_degrades_but_turn_succeeds() {
        let config = Config::default();
        let mut registry = AgentRegistry::new();
        registry.register(runner(
            "support",
            Arc::new(ScriptedProvider::always_text("still works")),
        ));
        let supervisor = Supervisor::new(
            &config,
            Arc::new(registry),
            Arc::new(ScriptedProvider::new(vec![])),
            Arc::new(CircuitBreaker::new(3, Duration::from_secs(60))),
            Arc::new(FailingCheckpointer),
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
        );
        assert!(!supervisor.is_degraded());
        let result = supervisor
            .run_turn(turn("s1", "hello", &["support"]))
            .await
            .unwrap();
        assert_eq!(result.reply, "still works");
        assert!(supervisor.is_degraded());
    }

    #[tokio::test]
    async fn deadline_exhaustion_funnels_into_invocation_failure() {
        let mut config = Config::default();
        config.supervisor.request_deadline_seconds = 0;
        config.supervisor.failover_enabled = false;
        config.supervisor.circuit_breaker_failure_threshold = 1;
        let h = harness(
            vec![("support", Arc::new(ScriptedProvider::always_text("never")))],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            config,
        );
        let result = h
            .supervisor
            .run_turn(turn("s1", "hello", &["support"]))
            .await
            .unwrap();
        assert_eq!(
            result.state.escalation_reason,
            EscalationReason::InvocationFailed
        );
        // The deadline failure counted against the circuit.
        assert_eq!(h.breaker.status("support"), crate::CircuitStatus::Open);
    }

    #[tokio::test]
    async fn checkpointed_messages_are_bounded() {
        let mut config = Config::default();
        config.supervisor.messages_max_len = 4;
        let h = harness(
            vec![(
                "support",
                Arc::new(ScriptedProvider::new(
                    (0..10)
                        .map(|i| svar_model::ChatResponse::text(format!("reply {i}")))
                        .collect(),
                )),
            )],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            config,
        );
        for i in 0..5 {
            h.supervisor
                .run_turn(turn("s1", &format!("question {i}"), &["support"]))
                .await
                .unwrap();
        }
        let saved = h.checkpointer.get("s1").await.unwrap().unwrap();
        assert!(saved.messages.len() <= 4);
    }

    #[tokio::test]
    async fn identical_turns_produce_identical_message_tails() {
        let run = |_: u32| async {
            let h = harness(
                vec![(
                    "billing",
                    Arc::new(ScriptedProvider::tool_then_text(
                        "c1",
                        "look_up_invoice",
                        r#"{"invoice_id":"INV-1"}"#,
                        "INV-1 is paid.",
                    )),
                )],
                Arc::new(NullScorer),
                Arc::new(StubHitlHandler),
                Config::default(),
            );
            let result = h
                .supervisor
                .run_turn(turn("s1", "is INV-1 paid?", &["billing"]))
                .await
                .unwrap();
            result
                .state
                .messages
                .iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(0).await, run(1).await);
    }

    #[tokio::test]
    async fn guarded_input_leaves_breaker_counters_untouched() {
        let mut config = Config::default();
        config.supervisor.failover_enabled = false;
        let mut registry = AgentRegistry::new();
        let profile = AgentProfileConfig::builtin_set().remove(0);
        registry.register(Arc::new(AgentRunner::new(
            profile,
            Default::default(),
            Arc::new(ScriptedProvider::always_text("unused")),
            Arc::new(ToolRegistry::build(default_tools(), vec![])),
            Arc::new(StaticRetriever::with_default_docs()),
            Arc::new(Guardrail::new(true, vec!["hack".into()], vec![], 8_000, 4_000)),
        )));
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(3600)));
        let supervisor = Supervisor::new(
            &config,
            Arc::new(registry),
            Arc::new(ScriptedProvider::new(vec![])),
            Arc::clone(&breaker),
            Arc::new(MemoryCheckpointer::new(Duration::from_secs(60))),
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
        );
        // Two real failures on record…
        breaker.record_failure("support");
        breaker.record_failure("support");
        // …a guard-rejected turn must neither reset nor increment them…
        supervisor
            .run_turn(turn("s1", "how to hack accounts", &["support"]))
            .await
            .unwrap();
        assert_eq!(breaker.status("support"), crate::CircuitStatus::Closed);
        // …so one more failure still opens the circuit at the threshold.
        breaker.record_failure("support");
        assert_eq!(breaker.status("support"), crate::CircuitStatus::Open);
    }

    #[tokio::test]
    async fn empty_suggestions_fall_back_to_support() {
        let h = harness(
            vec![(
                "support",
                Arc::new(ScriptedProvider::always_text("default agent")),
            )],
            Arc::new(NullScorer),
            Arc::new(StubHitlHandler),
            Config::default(),
        );
        let result = h.supervisor.run_turn(turn("s1", "hi", &[])).await.unwrap();
        assert_eq!(result.agent_id.as_deref(), Some("support"));
    }
}
